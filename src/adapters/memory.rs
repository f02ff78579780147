//! In-memory compute, image, model-server and registry adapters.
//!
//! They keep just enough state to drive the task chains end to end without
//! a platform behind them: servers come up `running` right away, stopped
//! servers go `ready`, post overlays are applied to the container spec.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    container_status, image_status, server_status, CacheImageInput, ContainerDetails,
    ContainerPostOverlayInput, ContainerSpec, ImageDetails, ImageUploadInput, NetworkDetails,
    NetworkQuery, ServerContainer, ServerCreateInput, ServerDetails, ServerDisk, ServerPortMapping,
    StorageCachedImage,
};
use crate::domain::models::ChatMessage;
use crate::domain::ports::{
    ChatRequest, ChatResponse, ComputeClient, ImageClient, LlmClientDriver, ModelRegistry,
    ServedModel,
};
use crate::drivers::ollama::sha256_digest;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub const MEMORY_HOST_IP: &str = "10.0.0.1";

#[derive(Debug, Default)]
pub struct ComputeState {
    pub servers: HashMap<String, ServerDetails>,
    pub containers: HashMap<String, ContainerDetails>,
    pub networks: Vec<NetworkDetails>,
    pub cached_images: Vec<StorageCachedImage>,
    pub created: Vec<ServerCreateInput>,
    pub cache_requests: Vec<CacheImageInput>,
    /// Fail this many overlay calls with an invalid-status error first.
    pub busy_overlay_calls: usize,
    /// Status a newly created server reports.
    pub create_status: Option<String>,
    next_id: usize,
}

#[derive(Debug, Default)]
pub struct MemoryCompute {
    state: Mutex<ComputeState>,
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ComputeState> {
        guard(&self.state)
    }

    fn set_power(&self, id: &str, server: &str, container: &str) -> DomainResult<()> {
        let mut state = self.state();
        let srv = state
            .servers
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found("server", id))?;
        srv.status = server.to_string();
        let ids: Vec<String> = srv.containers.iter().map(|c| c.id.clone()).collect();
        for ctr in &mut srv.containers {
            ctr.status = container.to_string();
        }
        for cid in ids {
            if let Some(ctr) = state.containers.get_mut(&cid) {
                ctr.status = container.to_string();
            }
        }
        Ok(())
    }

    fn overlay_call(&self, container_id: &str) -> DomainResult<MutexGuard<'_, ComputeState>> {
        let mut state = self.state();
        if state.busy_overlay_calls > 0 {
            state.busy_overlay_calls -= 1;
            return Err(DomainError::InvalidStatus(format!("container {container_id} is busy")));
        }
        if !state.containers.contains_key(container_id) {
            return Err(DomainError::not_found("container", container_id));
        }
        Ok(state)
    }
}

#[async_trait]
impl ComputeClient for MemoryCompute {
    async fn create_server(&self, input: &ServerCreateInput) -> DomainResult<String> {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("srv-{}", state.next_id);
        let status = state
            .create_status
            .clone()
            .unwrap_or_else(|| server_status::RUNNING.to_string());

        let mut containers = Vec::new();
        for (idx, ctr) in input.pod.containers.iter().enumerate() {
            let cid = format!("{id}-ctr-{idx}");
            containers.push(ServerContainer {
                id: cid.clone(),
                name: ctr.name.clone(),
                status: container_status::RUNNING.to_string(),
            });
            state.containers.insert(
                cid.clone(),
                ContainerDetails {
                    id: cid,
                    name: ctr.name.clone(),
                    status: container_status::RUNNING.to_string(),
                    guest_id: id.clone(),
                    spec: Some(ContainerSpec {
                        image: ctr.image.clone(),
                        volume_mounts: ctr.volume_mounts.clone(),
                    }),
                },
            );
        }
        let port_mappings = input
            .pod
            .port_mappings
            .iter()
            .zip(20000..)
            .map(|(pm, host_port)| ServerPortMapping {
                protocol: pm.protocol.clone(),
                port: pm.container_port,
                host_port,
            })
            .collect();
        let disks_info = input
            .disks
            .iter()
            .zip(0..)
            .map(|(d, index)| ServerDisk {
                id: format!("{id}-disk-{index}"),
                size: d.size,
                storage_type: d.backend.clone(),
                index,
            })
            .collect();

        let server = ServerDetails {
            id: id.clone(),
            name: input.name.clone(),
            status,
            host: "host-1".to_string(),
            host_id: "host-1".to_string(),
            host_access_ip: MEMORY_HOST_IP.to_string(),
            zone: "zone-1".to_string(),
            zone_id: "zone-1".to_string(),
            ips: "192.168.0.10".to_string(),
            containers,
            disks_info,
            port_mappings,
            ..Default::default()
        };
        state.servers.insert(id.clone(), server);
        state.created.push(input.clone());
        Ok(id)
    }

    async fn get_server(&self, id: &str) -> DomainResult<Option<ServerDetails>> {
        Ok(self.state().servers.get(id).cloned())
    }

    async fn list_servers(&self, ids: &[String]) -> DomainResult<Vec<ServerDetails>> {
        let state = self.state();
        Ok(ids.iter().filter_map(|id| state.servers.get(id).cloned()).collect())
    }

    async fn delete_server(&self, id: &str) -> DomainResult<()> {
        let mut state = self.state();
        if let Some(server) = state.servers.remove(id) {
            for ctr in server.containers {
                state.containers.remove(&ctr.id);
            }
        }
        Ok(())
    }

    async fn start_server(&self, id: &str) -> DomainResult<()> {
        self.set_power(id, server_status::RUNNING, container_status::RUNNING)
    }

    async fn stop_server(&self, id: &str) -> DomainResult<()> {
        self.set_power(id, server_status::READY, container_status::EXITED)
    }

    async fn get_container(&self, id: &str) -> DomainResult<Option<ContainerDetails>> {
        Ok(self.state().containers.get(id).cloned())
    }

    async fn container_add_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()> {
        let mut state = self.overlay_call(container_id)?;
        let disk = state
            .containers
            .get_mut(container_id)
            .and_then(|c| c.spec.as_mut())
            .and_then(|s| s.volume_mounts.get_mut(usize::try_from(input.index).unwrap_or(0)))
            .and_then(|m| m.disk.as_mut())
            .ok_or_else(|| DomainError::InvalidStatus(format!("container {container_id} has no disk mount")))?;
        disk.post_overlay.extend(input.post_overlay.iter().cloned());
        Ok(())
    }

    async fn container_remove_post_overlay(
        &self,
        container_id: &str,
        input: &ContainerPostOverlayInput,
    ) -> DomainResult<()> {
        let mut state = self.overlay_call(container_id)?;
        if let Some(disk) = state
            .containers
            .get_mut(container_id)
            .and_then(|c| c.spec.as_mut())
            .and_then(|s| s.volume_mounts.get_mut(usize::try_from(input.index).unwrap_or(0)))
            .and_then(|m| m.disk.as_mut())
        {
            disk.post_overlay.retain(|ov| !input.post_overlay.contains(ov));
        }
        Ok(())
    }

    async fn get_network(&self, id: &str) -> DomainResult<Option<NetworkDetails>> {
        Ok(self
            .state()
            .networks
            .iter()
            .find(|n| n.id == id || n.name == id)
            .cloned())
    }

    async fn list_networks(&self, query: &NetworkQuery) -> DomainResult<(Vec<NetworkDetails>, i64)> {
        let state = self.state();
        let matched: Vec<NetworkDetails> = state
            .networks
            .iter()
            .filter(|n| n.server_type == query.server_type && n.status == query.status)
            .filter(|n| query.vpc_id.as_deref().map_or(true, |vpc| n.vpc_id == vpc))
            .cloned()
            .collect();
        let total = i64::try_from(matched.len()).unwrap_or(i64::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok((matched.into_iter().take(limit).collect(), total))
    }

    async fn cache_image(&self, input: &CacheImageInput) -> DomainResult<()> {
        self.state().cache_requests.push(input.clone());
        Ok(())
    }

    async fn list_storage_cached_images(&self, image_ids: &[String]) -> DomainResult<Vec<StorageCachedImage>> {
        Ok(self
            .state()
            .cached_images
            .iter()
            .filter(|c| image_ids.contains(&c.cachedimage_id))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct ImageState {
    pub images: HashMap<String, ImageDetails>,
    pub actions: Vec<(String, String)>,
    pub uploads: Vec<ImageUploadInput>,
    /// Status an uploaded image reports, `active` when unset.
    pub upload_status: Option<String>,
    pub fail_upload: bool,
}

#[derive(Debug, Default)]
pub struct MemoryImages {
    state: Mutex<ImageState>,
}

impl MemoryImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ImageState> {
        guard(&self.state)
    }

    pub fn put(&self, image: ImageDetails) {
        self.state().images.insert(image.id.clone(), image);
    }
}

#[async_trait]
impl ImageClient for MemoryImages {
    async fn get_image(&self, id: &str) -> DomainResult<Option<ImageDetails>> {
        Ok(self.state().images.get(id).cloned())
    }

    async fn update_image_properties(&self, id: &str, properties: BTreeMap<String, String>) -> DomainResult<()> {
        let mut state = self.state();
        let image = state
            .images
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found("image", id))?;
        image.properties.extend(properties);
        Ok(())
    }

    async fn perform_image_action(&self, id: &str, action: &str, _body: serde_json::Value) -> DomainResult<()> {
        let mut state = self.state();
        if !state.images.contains_key(id) {
            return Err(DomainError::not_found("image", id));
        }
        state.actions.push((id.to_string(), action.to_string()));
        Ok(())
    }

    async fn upload_image(&self, input: &ImageUploadInput, path: &Path) -> DomainResult<ImageDetails> {
        let size = tokio::fs::metadata(path).await?.len();
        let mut state = self.state();
        if state.fail_upload {
            return Err(DomainError::Remote(format!("upload {}: storage full", input.generate_name)));
        }
        state.uploads.push(input.clone());
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        let image = ImageDetails {
            id: format!("img-upload-{}", state.uploads.len()),
            name: input.generate_name.clone(),
            status: state
                .upload_status
                .clone()
                .unwrap_or_else(|| image_status::ACTIVE.to_string()),
            disk_format: input.disk_format.clone(),
            size,
            min_disk: (size / (1024 * 1024)).max(1),
            properties: input.properties.clone(),
        };
        state.images.insert(image.id.clone(), image.clone());
        Ok(image)
    }
}

#[derive(Debug, Default)]
pub struct ModelServerState {
    /// Served models per base url.
    pub served: HashMap<String, Vec<ServedModel>>,
    pub pulled: Vec<String>,
    pub fail_pull: bool,
}

/// Model server that answers for any base url.
#[derive(Debug, Default)]
pub struct MemoryModelServer {
    state: Mutex<ModelServerState>,
}

impl MemoryModelServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ModelServerState> {
        guard(&self.state)
    }

    pub fn serve(&self, base_url: &str, model: ServedModel) {
        self.state()
            .served
            .entry(base_url.to_string())
            .or_default()
            .push(model);
    }
}

#[async_trait]
impl LlmClientDriver for MemoryModelServer {
    async fn list_models(&self, base_url: &str) -> DomainResult<Vec<ServedModel>> {
        Ok(self.state().served.get(base_url).cloned().unwrap_or_default())
    }

    async fn pull_model(&self, base_url: &str, name: &str) -> DomainResult<()> {
        let mut state = self.state();
        if state.fail_pull {
            return Err(DomainError::Remote(format!("pull {name}: manifest unknown")));
        }
        state.pulled.push(name.to_string());
        let digest = format!("sha256:{:0>64}", state.pulled.len());
        state.served.entry(base_url.to_string()).or_default().push(ServedModel {
            name: name.to_string(),
            digest,
            size: 0,
        });
        Ok(())
    }

    async fn delete_model(&self, base_url: &str, name: &str) -> DomainResult<()> {
        let mut state = self.state();
        let models = state.served.entry(base_url.to_string()).or_default();
        let before = models.len();
        models.retain(|m| m.name != name);
        if models.len() == before {
            return Err(DomainError::not_found("model", name));
        }
        Ok(())
    }

    async fn chat(&self, _base_url: &str, request: &ChatRequest) -> DomainResult<ChatResponse> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatResponse {
            model: request.model.clone(),
            message: ChatMessage::new("assistant", format!("echo: {last}")),
            done: true,
        })
    }
}

#[derive(Debug, Default)]
pub struct RegistryState {
    /// Raw manifests keyed by `name:tag`.
    pub manifests: HashMap<String, Vec<u8>>,
    /// Blob contents keyed by digest.
    pub blobs: HashMap<String, Vec<u8>>,
    pub downloads: Vec<String>,
}

/// Model registry serving whatever was published into it.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, RegistryState> {
        guard(&self.state)
    }

    /// Publish `name:tag` made of a config blob and layer blobs. Returns
    /// the manifest digest.
    pub fn publish(&self, name: &str, tag: &str, config: &[u8], layers: &[&[u8]]) -> String {
        let descriptor = |media_type: &str, bytes: &[u8]| {
            json!({"mediaType": media_type, "digest": sha256_digest(bytes), "size": bytes.len()})
        };
        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": descriptor("application/vnd.docker.container.image.v1+json", config),
            "layers": layers
                .iter()
                .copied()
                .map(|layer| descriptor("application/vnd.ollama.image.model", layer))
                .collect::<Vec<_>>(),
        })
        .to_string()
        .into_bytes();

        let mut state = self.state();
        state.blobs.insert(sha256_digest(config), config.to_vec());
        for layer in layers {
            state.blobs.insert(sha256_digest(layer), layer.to_vec());
        }
        let digest = sha256_digest(&manifest);
        state.manifests.insert(format!("{name}:{tag}"), manifest);
        digest
    }
}

#[async_trait]
impl ModelRegistry for MemoryRegistry {
    async fn fetch_manifest(&self, name: &str, tag: &str) -> DomainResult<Vec<u8>> {
        let key = format!("{name}:{tag}");
        self.state()
            .manifests
            .get(&key)
            .cloned()
            .ok_or_else(|| DomainError::not_found("registry object", key))
    }

    async fn download_blob(&self, _name: &str, digest: &str, dest: &Path) -> DomainResult<u64> {
        let blob = {
            let mut state = self.state();
            state.downloads.push(digest.to_string());
            state.blobs.get(digest).cloned()
        }
        .ok_or_else(|| DomainError::not_found("registry object", digest))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &blob).await?;
        Ok(blob.len() as u64)
    }
}
