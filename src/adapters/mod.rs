//! Adapters implementing the domain ports.

pub mod compute;
pub mod image;
pub mod memory;
pub mod ollama;
pub mod sqlite;

pub use compute::RestComputeClient;
pub use image::RestImageClient;
pub use memory::{MemoryCompute, MemoryImages, MemoryModelServer, MemoryRegistry};
pub use ollama::{OllamaClient, OllamaRegistryClient, DEFAULT_REGISTRY_URL};
