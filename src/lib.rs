//! OneCloud LLM service and monitor client.
//!
//! Two binaries share this library:
//!
//! - `llm`: the LLM container service. It manages Ollama and Dify pods on
//!   the compute service, a catalog of skus, images and instant models, and
//!   runs every long operation as a persisted staged task.
//! - `climc`: the command line client of the monitor service (alerts, node
//!   alerts, common alerts, alert records, metric queries, suggestions).
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): SQLite repositories and remote platform clients
//! - **REST client** (`mcclient`): session, resource managers, monitor helpers, option structs
//! - **Drivers** (`drivers`): per container type pod drivers
//! - **Service Layer** (`services`): operations, task runner and task handlers
//! - **API** (`api`): axum handlers of the LLM service
//! - **CLI Layer** (`cli`): climc commands and output
//! - **Infrastructure** (`infrastructure`): configuration and logging

pub mod adapters;
pub mod api;
pub mod cli;
pub mod domain;
pub mod drivers;
pub mod infrastructure;
pub mod mcclient;
pub mod services;

#[cfg(test)]
mod test_support;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, DatabaseConfig, TaskConfig};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use mcclient::{ClientError, Session};
