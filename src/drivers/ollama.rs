//! Ollama driver: a single `ollama serve` container with its model store
//! on the first data disk.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{access_url, DownloadedModel, LlmContainerDriver, PodRequest};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{
    ContainerVolumeMount, PodContainerCreateInput, PostOverlay, PostOverlayImage,
    ServerCreateInput, ServerDetails,
};
use crate::domain::models::llm::split_model_name;
use crate::domain::models::{
    AccessInfo, EnvVar, InstantModel, InternalInstantModelInfo, LlmContainerType,
    LlmInstantModel, MountDirInfo,
};
use crate::domain::ports::{LlmClientDriver, ModelRegistry};

pub const OLLAMA_PORT: i32 = 11434;
pub const OLLAMA_HOME: &str = "/root/.ollama";
pub const OLLAMA_MODELS_DIR: &str = "/root/.ollama/models";
pub const OLLAMA_MANIFEST_PREFIX: &str = "manifests/registry.ollama.ai/library";
pub const OLLAMA_BLOBS_DIR: &str = "blobs";
const MODEL_ID_LEN: usize = 12;

/// Short model id derived from a manifest digest (`sha256:<hex>`).
pub fn model_id_from_digest(digest: &str) -> String {
    let hex = digest
        .strip_prefix("sha256:")
        .or_else(|| digest.strip_prefix("sha256-"))
        .unwrap_or(digest);
    hex.chars().take(MODEL_ID_LEN).collect()
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

pub fn manifest_path(name: &str, tag: &str) -> String {
    format!("{OLLAMA_MANIFEST_PREFIX}/{name}/{tag}")
}

/// Store path of a blob; `sha256:<hex>` is kept as `blobs/sha256-<hex>`.
fn blob_path(digest: &str) -> DomainResult<String> {
    match digest.strip_prefix("sha256:") {
        Some(hex) if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(format!("{OLLAMA_BLOBS_DIR}/sha256-{hex}"))
        }
        _ => Err(DomainError::Validation(format!("invalid blob digest {digest}"))),
    }
}

#[derive(Debug, Deserialize)]
struct ManifestLayer {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    config: ManifestLayer,
    #[serde(default)]
    layers: Vec<ManifestLayer>,
}

/// `name:tag` of a manifest path, if the path is one.
fn name_tag_from_manifest(path: &str) -> Option<String> {
    let idx = path.find(OLLAMA_MANIFEST_PREFIX)?;
    let rest = path[idx + OLLAMA_MANIFEST_PREFIX.len()..].trim_matches('/');
    let (name, tag) = rest.split_once('/')?;
    if name.is_empty() || tag.is_empty() || tag.contains('/') {
        return None;
    }
    Some(format!("{name}:{tag}"))
}

pub struct OllamaDriver {
    client: Arc<dyn LlmClientDriver>,
    registry: Arc<dyn ModelRegistry>,
}

impl OllamaDriver {
    pub fn new(client: Arc<dyn LlmClientDriver>, registry: Arc<dyn ModelRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl LlmContainerDriver for OllamaDriver {
    fn container_type(&self) -> LlmContainerType {
        LlmContainerType::Ollama
    }

    fn pod_create_input(&self, request: &PodRequest<'_>) -> DomainResult<ServerCreateInput> {
        let image = request.image(LlmContainerType::Ollama.as_str())?;
        let mut input = request.server_input(&[OLLAMA_PORT])?;

        let mut envs = request.envs.to_vec();
        if !envs.iter().any(|e| e.key == "OLLAMA_HOST") {
            envs.push(EnvVar {
                key: "OLLAMA_HOST".to_string(),
                value: format!("0.0.0.0:{OLLAMA_PORT}"),
            });
        }

        input.pod.containers.push(PodContainerCreateInput {
            name: format!("{}-ollama", request.name),
            image: image.image_ref(),
            image_credential_id: image.credential_id.clone(),
            command: vec!["/bin/ollama".to_string()],
            args: vec!["serve".to_string()],
            envs,
            volume_mounts: vec![ContainerVolumeMount::disk(0, "ollama", OLLAMA_HOME)],
            devices: request.devices.to_vec(),
            always_restart: true,
        });
        Ok(input)
    }

    fn llm_url(&self, server: &ServerDetails, access_infos: &[AccessInfo]) -> DomainResult<String> {
        access_url(server, access_infos, OLLAMA_PORT)
    }

    fn dir_post_overlay(&self, dir: &MountDirInfo) -> PostOverlay {
        let mut path_map = BTreeMap::new();
        path_map.insert(dir.image_path.clone(), dir.container_target_dir.clone());
        PostOverlay {
            host_lower_dir: Vec::new(),
            container_target_dir: dir.container_target_dir.clone(),
            image: Some(PostOverlayImage {
                id: dir.image_id.clone(),
                path_map,
            }),
        }
    }

    fn instant_model_id_by_post_overlay(
        &self,
        overlay: &PostOverlay,
        name_to_id: &HashMap<String, String>,
    ) -> Option<String> {
        let mut candidates: Vec<&str> = vec![overlay.container_target_dir.as_str()];
        if let Some(image) = &overlay.image {
            candidates.extend(image.path_map.values().map(String::as_str));
            candidates.extend(image.path_map.keys().map(String::as_str));
        }
        candidates
            .into_iter()
            .filter_map(name_tag_from_manifest)
            .find_map(|name_tag| name_to_id.get(&name_tag).cloned())
    }

    fn validate_mounts(&self, mounts: &[String], name: &str, tag: &str) -> DomainResult<Vec<String>> {
        let mut result: Vec<String> = Vec::new();
        for mount in mounts {
            let mount = mount.trim().trim_start_matches("./").trim_end_matches('/');
            if mount.is_empty() {
                continue;
            }
            if mount.starts_with('/') || mount.split('/').any(|seg| seg == "..") {
                return Err(DomainError::Validation(format!(
                    "mount {mount} must be a relative path inside the image"
                )));
            }
            if !mount.starts_with("manifests/") && !mount.starts_with("blobs/") {
                return Err(DomainError::Validation(format!(
                    "mount {mount} is neither a manifest nor a blob"
                )));
            }
            if !result.iter().any(|m| m == mount) {
                result.push(mount.to_string());
            }
        }
        let manifest = manifest_path(name, tag);
        if !result.iter().any(|m| m == &manifest) {
            return Err(DomainError::Validation(format!(
                "mounts of {name}:{tag} must include {manifest}"
            )));
        }
        Ok(result)
    }

    fn image_internal_path_mounts(&self, model: &InstantModel) -> BTreeMap<String, String> {
        model
            .mounts
            .iter()
            .map(|m| (m.clone(), format!("{OLLAMA_MODELS_DIR}/{m}")))
            .collect()
    }

    async fn probed_instant_models(
        &self,
        llm_url: &str,
        ids: &[String],
    ) -> DomainResult<HashMap<String, InternalInstantModelInfo>> {
        let served = self.client.list_models(llm_url).await?;
        let mut probed = HashMap::new();
        for model in served {
            let model_id = model_id_from_digest(&model.digest);
            if model_id.is_empty() || (!ids.is_empty() && !ids.contains(&model_id)) {
                continue;
            }
            let (name, tag) = split_model_name(&model.name);
            probed.insert(
                model_id.clone(),
                InternalInstantModelInfo {
                    model_id,
                    name,
                    tag,
                    size: model.size,
                },
            );
        }
        debug!(url = llm_url, count = probed.len(), "probed ollama models");
        Ok(probed)
    }

    async fn pre_install_model(&self, _llm_url: &str, _model: &LlmInstantModel) -> DomainResult<()> {
        Ok(())
    }

    async fn install_model(&self, _llm_url: &str, _dirs: &[String], _model_ids: &[String]) -> DomainResult<()> {
        // Ollama picks up manifests from the overlay without a reload.
        Ok(())
    }

    async fn uninstall_model(&self, llm_url: &str, model: &LlmInstantModel) -> DomainResult<()> {
        let name = format!("{}:{}", model.model_name, model.tag);
        match self.client.delete_model(llm_url, &name).await {
            Err(err) if err.is_not_found() => {
                warn!(model = %name, "model already absent from ollama");
                Ok(())
            }
            other => other,
        }
    }

    async fn pull_model(&self, llm_url: &str, model_name: &str) -> DomainResult<()> {
        self.client.pull_model(llm_url, model_name).await
    }

    async fn download_model(&self, dir: &Path, name: &str, tag: &str) -> DomainResult<DownloadedModel> {
        let raw = self
            .registry
            .fetch_manifest(name, tag)
            .await
            .map_err(|e| e.context(format!("fetch manifest of {name}:{tag}")))?;
        let manifest: Manifest = serde_json::from_slice(&raw)?;

        let manifest_rel = manifest_path(name, tag);
        let manifest_file = dir.join(&manifest_rel);
        if let Some(parent) = manifest_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&manifest_file, &raw).await?;

        let mut mounts = vec![manifest_rel];
        for layer in std::iter::once(&manifest.config).chain(&manifest.layers) {
            let rel = blob_path(&layer.digest)?;
            if mounts.contains(&rel) {
                continue;
            }
            self.registry
                .download_blob(name, &layer.digest, &dir.join(&rel))
                .await
                .map_err(|e| e.context(format!("download {name}:{tag}")))?;
            mounts.push(rel);
        }

        let model_id = model_id_from_digest(&sha256_digest(&raw));
        info!(model = %format!("{name}:{tag}"), %model_id, blobs = mounts.len() - 1, "model downloaded");
        Ok(DownloadedModel {
            model_id,
            mounts: self.validate_mounts(&mounts, name, tag)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryRegistry;
    use crate::domain::models::{LlmImage, ResourceBase};
    use crate::domain::ports::{ChatRequest, ChatResponse, ServedModel};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubClient {
        served: Vec<ServedModel>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClientDriver for StubClient {
        async fn list_models(&self, _base_url: &str) -> DomainResult<Vec<ServedModel>> {
            Ok(self.served.clone())
        }

        async fn pull_model(&self, _base_url: &str, _name: &str) -> DomainResult<()> {
            Ok(())
        }

        async fn delete_model(&self, _base_url: &str, name: &str) -> DomainResult<()> {
            self.deleted.lock().unwrap().push(name.to_string());
            Err(DomainError::not_found("model", name))
        }

        async fn chat(&self, _base_url: &str, _request: &ChatRequest) -> DomainResult<ChatResponse> {
            Err(DomainError::Unsupported("chat".into()))
        }
    }

    fn driver() -> OllamaDriver {
        driver_with_registry(Arc::new(MemoryRegistry::new()))
    }

    fn driver_with_registry(registry: Arc<MemoryRegistry>) -> OllamaDriver {
        let client = Arc::new(StubClient {
            served: vec![
                ServedModel {
                    name: "qwen2:7b".into(),
                    digest: "sha256:dd314f039b9d1234".into(),
                    size: 10,
                },
                ServedModel {
                    name: "llama3".into(),
                    digest: "365c0bd3c000a25d28ddbf732fe1c6add414de7275464c4e4d1c3b5fcb5d8ad1".into(),
                    size: 20,
                },
            ],
            ..Default::default()
        });
        OllamaDriver::new(client, registry)
    }

    #[test]
    fn test_model_id_from_digest() {
        assert_eq!(model_id_from_digest("sha256:dd314f039b9d1234"), "dd314f039b9d");
        assert_eq!(model_id_from_digest("abc"), "abc");
    }

    #[test]
    fn test_validate_mounts() {
        let drv = driver();
        let mounts = vec![
            "manifests/registry.ollama.ai/library/qwen2/7b/".to_string(),
            "./blobs/sha256-aaa".to_string(),
            "blobs/sha256-aaa".to_string(),
        ];
        let normalized = drv.validate_mounts(&mounts, "qwen2", "7b").unwrap();
        assert_eq!(
            normalized,
            vec!["manifests/registry.ollama.ai/library/qwen2/7b", "blobs/sha256-aaa"]
        );

        let missing = drv.validate_mounts(&["blobs/sha256-aaa".to_string()], "qwen2", "7b");
        assert!(matches!(missing, Err(DomainError::Validation(_))));

        let escape = drv.validate_mounts(&["blobs/../../etc".to_string()], "qwen2", "7b");
        assert!(matches!(escape, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_overlay_round_trip_to_model_id() {
        let drv = driver();
        let overlay = drv.dir_post_overlay(&MountDirInfo {
            image_id: "img-1".into(),
            image_path: manifest_path("qwen2", "7b"),
            container_target_dir: format!("{OLLAMA_MODELS_DIR}/{}", manifest_path("qwen2", "7b")),
        });
        assert_eq!(overlay.image.as_ref().unwrap().id, "img-1");

        let mut names = HashMap::new();
        names.insert("qwen2:7b".to_string(), "dd314f039b9d".to_string());
        assert_eq!(
            drv.instant_model_id_by_post_overlay(&overlay, &names).as_deref(),
            Some("dd314f039b9d")
        );

        let blob = PostOverlay {
            container_target_dir: format!("{OLLAMA_MODELS_DIR}/blobs/sha256-aaa"),
            ..Default::default()
        };
        assert!(drv.instant_model_id_by_post_overlay(&blob, &names).is_none());
    }

    #[tokio::test]
    async fn test_probed_models_filtered_by_id() {
        let drv = driver();
        let all = drv.probed_instant_models("http://x", &[]).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["365c0bd3c000"].tag, "latest");

        let one = drv
            .probed_instant_models("http://x", &["dd314f039b9d".to_string()])
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one["dd314f039b9d"].name, "qwen2");
    }

    #[tokio::test]
    async fn test_uninstall_tolerates_missing_model() {
        let drv = driver();
        let model = LlmInstantModel {
            base: ResourceBase::new("m", "ready"),
            llm_id: "llm".into(),
            model_id: "dd314f039b9d".into(),
            model_name: "qwen2".into(),
            tag: "7b".into(),
            is_probed: true,
            is_mounted: true,
            is_system: false,
        };
        drv.uninstall_model("http://x", &model).await.unwrap();
    }

    #[test]
    fn test_pod_create_input() {
        let drv = driver();
        let image = LlmImage {
            base: ResourceBase::new("ollama", "active"),
            image_name: "registry/ollama".into(),
            image_label: "0.5".into(),
            credential_id: String::new(),
            llm_type: LlmContainerType::Ollama,
        };
        let volumes = vec![crate::domain::models::VolumeSpec {
            size_mb: 10240,
            storage_type: "local".into(),
            template_id: String::new(),
        }];
        let mut images = BTreeMap::new();
        images.insert("ollama".to_string(), image);
        let request = PodRequest {
            name: "llm-a",
            project_id: "p",
            cpu: 4,
            memory_mb: 8192,
            volumes: &volumes,
            port_mappings: &[],
            devices: &[],
            envs: &[],
            bandwidth_mb: 100,
            network_type: "hostlocal",
            network_id: "",
            prefer_host: "",
            images,
        };
        let input = drv.pod_create_input(&request).unwrap();
        assert_eq!(input.hypervisor, "pod");
        assert_eq!(input.pod.containers.len(), 1);
        let ctr = &input.pod.containers[0];
        assert_eq!(ctr.image, "registry/ollama:0.5");
        assert_eq!(ctr.args, vec!["serve"]);
        assert!(ctr.envs.iter().any(|e| e.key == "OLLAMA_HOST"));
        assert_eq!(input.pod.port_mappings[0].container_port, OLLAMA_PORT);
        assert_eq!(input.nets[0].bw_limit, 100);
    }

    #[tokio::test]
    async fn test_download_model_lays_out_store() {
        let registry = Arc::new(MemoryRegistry::new());
        let config: &[u8] = br#"{"model_format":"gguf"}"#;
        let manifest_digest = registry.publish("qwen2", "7b", config, &[b"weights".as_slice(), b"template".as_slice()]);
        let drv = driver_with_registry(registry.clone());
        let dir = tempfile::tempdir().unwrap();

        let downloaded = drv.download_model(dir.path(), "qwen2", "7b").await.unwrap();
        assert_eq!(downloaded.model_id, model_id_from_digest(&manifest_digest));
        assert_eq!(downloaded.mounts.len(), 4);
        assert_eq!(downloaded.mounts[0], manifest_path("qwen2", "7b"));
        for mount in &downloaded.mounts {
            assert!(dir.path().join(mount).is_file(), "{mount}");
        }
        let weights = format!("blobs/{}", sha256_digest(b"weights").replace(':', "-"));
        assert_eq!(std::fs::read(dir.path().join(weights)).unwrap(), b"weights");
        assert_eq!(registry.state().downloads.len(), 3);
    }

    #[tokio::test]
    async fn test_download_unknown_model() {
        let drv = driver();
        let dir = tempfile::tempdir().unwrap();
        let err = drv.download_model(dir.path(), "nope", "1b").await.unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn test_blob_path_rejects_odd_digests() {
        let hex = "a".repeat(64);
        assert_eq!(blob_path(&format!("sha256:{hex}")).unwrap(), format!("blobs/sha256-{hex}"));
        assert!(blob_path("sha256:../../etc/passwd").is_err());
        assert!(blob_path(&format!("md5:{hex}")).is_err());
    }
}
