//! Common columns shared by every persisted resource.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Columns every resource table carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceBase {
    pub fn new(name: impl Into<String>, status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            status: status.into(),
            project_id: String::new(),
            description: String::new(),
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A persisted resource stored in its own table.
///
/// The whole value is serialized into the row, with the common columns
/// duplicated for indexing.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Backing table name.
    const TABLE: &'static str;
    /// Singular REST keyword, e.g. `llm`.
    const KEYWORD: &'static str;
    /// Plural REST keyword, e.g. `llms`.
    const KEYWORD_PLURAL: &'static str;

    fn base(&self) -> &ResourceBase;
    fn base_mut(&mut self) -> &mut ResourceBase;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn status(&self) -> &str {
        &self.base().status
    }

    fn set_status(&mut self, status: &str) {
        let base = self.base_mut();
        base.status = status.to_string();
        base.touch();
    }
}

/// Implements [`Resource`] for a struct with a flattened `base` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $table:literal, $keyword:literal, $plural:literal) => {
        impl $crate::domain::models::resource::Resource for $ty {
            const TABLE: &'static str = $table;
            const KEYWORD: &'static str = $keyword;
            const KEYWORD_PLURAL: &'static str = $plural;

            fn base(&self) -> &$crate::domain::models::resource::ResourceBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::domain::models::resource::ResourceBase {
                &mut self.base
            }
        }
    };
}

/// Paging and name filter accepted by plain list endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceListInput {
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Generic list envelope used on the wire: `{"<plural>": [...], "total": n}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOutput<T> {
    pub data: Vec<T>,
    pub total: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
