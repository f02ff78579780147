//! Minimal REST client for the platform services.
//!
//! `Session` carries the endpoint and token, `ResourceManager` maps the
//! keyword conventions onto HTTP calls, and `modules` lists the managers.

pub mod errors;
pub mod modules;
pub mod options;
pub mod params;
pub mod resource;
pub mod session;

pub use errors::ClientError;
pub use params::struct_to_params;
pub use resource::{ListResult, ResourceManager, SubmitResult};
pub use session::Session;
