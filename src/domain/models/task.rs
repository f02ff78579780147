//! Persisted task record.
//!
//! A task drives one object through a sequence of named stages. Each stage
//! is persisted before it runs so a restarted service can resume it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a worker
    Queued,
    /// A stage is executing
    Running,
    /// Parked until all child tasks are terminal
    Waiting,
    Complete,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "complete" | "completed" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Queued => vec![Self::Running, Self::Failed],
            Self::Running => vec![Self::Running, Self::Waiting, Self::Complete, Self::Failed],
            Self::Waiting => vec![Self::Running, Self::Failed],
            Self::Complete | Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Name of the first stage every task starts in.
pub const INIT_STAGE: &str = "on_init";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub task_name: String,
    pub obj_type: String,
    pub obj_id: String,
    pub obj_name: String,
    pub stage: String,
    pub status: TaskStatus,
    pub params: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        task_name: impl Into<String>,
        obj_type: impl Into<String>,
        obj_id: impl Into<String>,
        obj_name: impl Into<String>,
        params: serde_json::Value,
        parent_task_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_name: task_name.into(),
            obj_type: obj_type.into(),
            obj_id: obj_id.into(),
            obj_name: obj_name.into(),
            stage: INIT_STAGE.to_string(),
            status: TaskStatus::Queued,
            params,
            result: None,
            reason: None,
            parent_task_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a typed value out of the task params.
    pub fn param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store a value in the task params, turning them into an object if needed.
    pub fn set_param(&mut self, key: &str, value: impl Serialize) {
        if !self.params.is_object() {
            self.params = serde_json::json!({});
        }
        if let (Some(map), Ok(value)) = (self.params.as_object_mut(), serde_json::to_value(value)) {
            map.insert(key.to_string(), value);
        }
    }
}
