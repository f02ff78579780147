//! Ports to the compute and image services.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::compute::{
    CacheImageInput, ContainerDetails, ContainerPostOverlayInput, ImageDetails, ImageUploadInput,
    NetworkDetails, NetworkQuery, ServerCreateInput, ServerDetails, StorageCachedImage,
};

#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Create a pod, returning the new server id
    async fn create_server(&self, input: &ServerCreateInput) -> DomainResult<String>;

    /// `None` when the server does not exist
    async fn get_server(&self, id: &str) -> DomainResult<Option<ServerDetails>>;

    async fn list_servers(&self, ids: &[String]) -> DomainResult<Vec<ServerDetails>>;

    async fn delete_server(&self, id: &str) -> DomainResult<()>;

    async fn start_server(&self, id: &str) -> DomainResult<()>;

    async fn stop_server(&self, id: &str) -> DomainResult<()>;

    async fn get_container(&self, id: &str) -> DomainResult<Option<ContainerDetails>>;

    async fn container_add_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()>;

    async fn container_remove_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()>;

    async fn get_network(&self, id: &str) -> DomainResult<Option<NetworkDetails>>;

    /// Matching networks and the total count reported by the service
    async fn list_networks(&self, query: &NetworkQuery) -> DomainResult<(Vec<NetworkDetails>, i64)>;

    async fn cache_image(&self, input: &CacheImageInput) -> DomainResult<()>;

    /// Storage cache copies of the given images
    async fn list_storage_cached_images(
        &self,
        image_ids: &[String],
    ) -> DomainResult<Vec<StorageCachedImage>>;
}

#[async_trait]
pub trait ImageClient: Send + Sync {
    /// `None` when the image does not exist
    async fn get_image(&self, id: &str) -> DomainResult<Option<ImageDetails>>;

    async fn update_image_properties(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
    ) -> DomainResult<()>;

    async fn perform_image_action(
        &self,
        id: &str,
        action: &str,
        body: serde_json::Value,
    ) -> DomainResult<()>;

    /// Upload the file at `path` as a new image.
    async fn upload_image(&self, input: &ImageUploadInput, path: &Path) -> DomainResult<ImageDetails>;
}
