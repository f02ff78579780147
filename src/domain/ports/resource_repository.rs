use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Resource;

/// Filters for listing resources.
///
/// Field names refer to keys of the serialized resource.
#[derive(Default, Debug, Clone)]
pub struct ResourceFilter {
    pub equals: Vec<(String, Value)>,
    pub in_values: Vec<(String, Vec<String>)>,
    pub statuses: Vec<String>,
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub order_desc_created: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.equals.push((field.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn in_values(mut self, field: &str, values: Vec<String>) -> Self {
        self.in_values.push((field.to_string(), values));
        self
    }

    #[must_use]
    pub fn status(mut self, status: &str) -> Self {
        self.statuses.push(status.to_string());
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn newest_first(mut self) -> Self {
        self.order_desc_created = true;
        self
    }

    #[must_use]
    pub fn page(mut self, limit: Option<i64>, offset: Option<i64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Repository port for one resource table
#[async_trait]
pub trait ResourceRepository<T: Resource>: Send + Sync {
    async fn insert(&self, item: &T) -> DomainResult<()>;

    async fn get(&self, id: &str) -> DomainResult<Option<T>>;

    /// Update an existing row, failing with not found if it vanished
    async fn update(&self, item: &T) -> DomainResult<()>;

    async fn delete(&self, id: &str) -> DomainResult<()>;

    async fn list(&self, filter: &ResourceFilter) -> DomainResult<Vec<T>>;

    /// Count rows matching the filter, ignoring paging
    async fn count(&self, filter: &ResourceFilter) -> DomainResult<i64>;

    /// Fetch by id, failing with not found
    async fn fetch(&self, id: &str) -> DomainResult<T> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(T::KEYWORD, id))
    }

    /// Resolve an id or a unique name.
    async fn fetch_by_id_or_name(&self, ident: &str) -> DomainResult<T> {
        if let Some(item) = self.get(ident).await? {
            return Ok(item);
        }
        let mut matches = self.list(&ResourceFilter::new().name(ident)).await?;
        match matches.len() {
            0 => Err(DomainError::not_found(T::KEYWORD, ident)),
            1 => Ok(matches.remove(0)),
            _ => Err(DomainError::duplicate(
                T::KEYWORD,
                format!("name {ident} matches {} records", matches.len()),
            )),
        }
    }
}
