//! Compute service adapter over the REST client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    CacheImageInput, ContainerDetails, ContainerPostOverlayInput, NetworkDetails, NetworkQuery,
    ServerCreateInput, ServerDetails, StorageCachedImage,
};
use crate::domain::ports::ComputeClient;
use crate::mcclient::modules::compute::{
    CACHED_IMAGES, CONTAINERS, NETWORKS, SERVERS, STORAGE_CACHED_IMAGES,
};
use crate::mcclient::{ClientError, ResourceManager, Session};

/// Page size used when listing servers and cache entries.
const LIST_PAGE_SIZE: usize = 1000;

pub struct RestComputeClient {
    session: Session,
}

impl RestComputeClient {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        manager: &ResourceManager,
        id: &str,
    ) -> DomainResult<Option<T>> {
        match manager.get(&self.session, id, &json!({"details": true})).await {
            Ok(body) => Ok(Some(serde_json::from_value(body)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(DomainError::from(err).context(format!("get {} {id}", manager.keyword))),
        }
    }
}

fn decode_all<T: DeserializeOwned>(data: Vec<Value>) -> DomainResult<Vec<T>> {
    data.into_iter()
        .map(|item| serde_json::from_value(item).map_err(DomainError::from))
        .collect()
}

fn remote(context: String) -> impl FnOnce(ClientError) -> DomainError {
    move |err| DomainError::from(err).context(context)
}

#[async_trait]
impl ComputeClient for RestComputeClient {
    async fn create_server(&self, input: &ServerCreateInput) -> DomainResult<String> {
        let body = serde_json::to_value(input)?;
        let created = SERVERS
            .create(&self.session, &body)
            .await
            .map_err(remote(format!("create server {}", input.name)))?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DomainError::Remote("server create response carries no id".to_string()))
    }

    async fn get_server(&self, id: &str) -> DomainResult<Option<ServerDetails>> {
        self.get_optional(&SERVERS, id).await
    }

    async fn list_servers(&self, ids: &[String]) -> DomainResult<Vec<ServerDetails>> {
        let mut servers = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LIST_PAGE_SIZE) {
            let params = json!({
                "id": chunk,
                "limit": LIST_PAGE_SIZE,
                "details": true,
                "scope": "maxallowed",
            });
            let result = SERVERS
                .list(&self.session, &params)
                .await
                .map_err(remote("list servers".to_string()))?;
            servers.extend(decode_all::<ServerDetails>(result.data)?);
        }
        Ok(servers)
    }

    async fn delete_server(&self, id: &str) -> DomainResult<()> {
        let params = json!({"override_pending_delete": true});
        match SERVERS.delete(&self.session, id, &params).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(server_id = id, "server already gone");
                Ok(())
            }
            Err(err) => Err(DomainError::from(err).context(format!("delete server {id}"))),
        }
    }

    async fn start_server(&self, id: &str) -> DomainResult<()> {
        SERVERS
            .perform_action(&self.session, id, "start", &json!({}))
            .await
            .map_err(remote(format!("start server {id}")))?;
        Ok(())
    }

    async fn stop_server(&self, id: &str) -> DomainResult<()> {
        SERVERS
            .perform_action(&self.session, id, "stop", &json!({}))
            .await
            .map_err(remote(format!("stop server {id}")))?;
        Ok(())
    }

    async fn get_container(&self, id: &str) -> DomainResult<Option<ContainerDetails>> {
        self.get_optional(&CONTAINERS, id).await
    }

    async fn container_add_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()> {
        CONTAINERS
            .perform_action(
                &self.session,
                container_id,
                "add-volume-mount-post-overlay",
                &serde_json::to_value(input)?,
            )
            .await
            .map_err(remote("PerformAction add-volume-mount-post-overlay".to_string()))?;
        Ok(())
    }

    async fn container_remove_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()> {
        CONTAINERS
            .perform_action(
                &self.session,
                container_id,
                "remove-volume-mount-post-overlay",
                &serde_json::to_value(input)?,
            )
            .await
            .map_err(remote("PerformAction remove-volume-mount-post-overlay".to_string()))?;
        Ok(())
    }

    async fn get_network(&self, id: &str) -> DomainResult<Option<NetworkDetails>> {
        self.get_optional(&NETWORKS, id).await
    }

    async fn list_networks(&self, query: &NetworkQuery) -> DomainResult<(Vec<NetworkDetails>, i64)> {
        let result = NETWORKS
            .list(&self.session, &serde_json::to_value(query)?)
            .await
            .map_err(remote("list networks".to_string()))?;
        let total = result.total;
        Ok((decode_all(result.data)?, total))
    }

    async fn cache_image(&self, input: &CacheImageInput) -> DomainResult<()> {
        CACHED_IMAGES
            .perform_class_action(&self.session, "cache-image", &serde_json::to_value(input)?)
            .await
            .map_err(remote("PerformClassAction cache-image".to_string()))?;
        Ok(())
    }

    async fn list_storage_cached_images(
        &self,
        image_ids: &[String],
    ) -> DomainResult<Vec<StorageCachedImage>> {
        if image_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = format!("cachedimage_id.in({})", image_ids.join(","));
        let mut entries = Vec::new();
        let mut offset = 0i64;
        loop {
            let params = json!({
                "scope": "max",
                "filter": [filter],
                "field": ["storagecache_id", "cachedimage_id", "status"],
                "limit": LIST_PAGE_SIZE,
                "offset": offset,
            });
            let result = STORAGE_CACHED_IMAGES
                .list(&self.session, &params)
                .await
                .map_err(remote("list storage cached images".to_string()))?;
            let fetched = result.data.len() as i64;
            entries.extend(decode_all::<StorageCachedImage>(result.data)?);
            offset += fetched;
            if fetched == 0 || offset >= result.total {
                break;
            }
        }
        Ok(entries)
    }
}
