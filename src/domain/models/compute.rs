//! Wire types of the compute and image services.
//!
//! Only the fields this service reads or writes are modelled; unknown
//! fields are ignored on input.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::sku::{DeviceSpec, EnvVar};

pub mod server_status {
    pub const RUNNING: &str = "running";
    pub const READY: &str = "ready";
    pub const CREATE_FAIL: &str = "create_fail";
    pub const DELETING: &str = "deleting";
}

pub mod container_status {
    pub const RUNNING: &str = "running";
    pub const EXITED: &str = "exited";
    pub const CRASH_LOOP_BACK_OFF: &str = "crash_loop_back_off";
    pub const CREATED: &str = "created";

    /// Statuses in which the volume mounts of a container can change.
    pub const FINAL: &[&str] = &[RUNNING, EXITED, CRASH_LOOP_BACK_OFF, CREATED];

    pub fn is_final(status: &str) -> bool {
        FINAL.contains(&status)
    }
}

pub mod image_status {
    pub const ACTIVE: &str = "active";
    pub const SAVING: &str = "saving";
    pub const KILLED: &str = "killed";
    pub const DEACTIVATED: &str = "deactivated";
    pub const DELETED: &str = "deleted";

    pub const DISK_FORMAT_TGZ: &str = "tgz";
}

pub const NETWORK_TYPE_HOSTLOCAL: &str = "hostlocal";
pub const NETWORK_TYPE_GUEST: &str = "guest";
pub const NETWORK_STATUS_AVAILABLE: &str = "available";
pub const DEFAULT_VPC_ID: &str = "default";
pub const HOST_TYPE_CONTAINER: &str = "container";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOverlayImage {
    pub id: String,
    /// Image path to container path.
    #[serde(default)]
    pub path_map: BTreeMap<String, String>,
}

/// Overlay layer stacked on a container disk mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOverlay {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_lower_dir: Vec<String>,
    #[serde(default)]
    pub container_target_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PostOverlayImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerVolumeMountDisk {
    #[serde(default)]
    pub index: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_directory: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_overlay: Vec<PostOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerVolumeMount {
    #[serde(rename = "type", default)]
    pub mount_type: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<ContainerVolumeMountDisk>,
    #[serde(default)]
    pub read_only: bool,
}

impl ContainerVolumeMount {
    pub fn disk(index: i32, sub_directory: &str, mount_path: &str) -> Self {
        Self {
            mount_type: "disk".to_string(),
            mount_path: mount_path.to_string(),
            disk: Some(ContainerVolumeMountDisk {
                index,
                sub_directory: sub_directory.to_string(),
                post_overlay: Vec::new(),
            }),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodContainerCreateInput {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_credential_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envs: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<ContainerVolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub always_restart: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodPortMapping {
    pub protocol: String,
    pub container_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodCreateInput {
    pub containers: Vec<PodContainerCreateInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PodPortMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Size in MB.
    pub size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub net_type: String,
    #[serde(default)]
    pub bw_limit: i64,
}

/// Body of `POST /servers` for a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCreateInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    pub hypervisor: String,
    pub vcpu_count: i64,
    pub vmem_size: i64,
    pub disks: Vec<DiskConfig>,
    pub nets: Vec<NetworkConfig>,
    pub pod: PodCreateInput,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefer_host: String,
    #[serde(default)]
    pub auto_start: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerContainer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDisk {
    pub id: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNic {
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub ip_addr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPortMapping {
    pub protocol: String,
    pub port: i32,
    pub host_port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub host_access_ip: String,
    #[serde(default, rename = "host_eip")]
    pub host_eip: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub ips: String,
    #[serde(default)]
    pub last_start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub containers: Vec<ServerContainer>,
    #[serde(default)]
    pub disks_info: Vec<ServerDisk>,
    #[serde(default)]
    pub nics: Vec<ServerNic>,
    #[serde(default)]
    pub port_mappings: Vec<ServerPortMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub volume_mounts: Vec<ContainerVolumeMount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub guest_id: String,
    #[serde(default)]
    pub spec: Option<ContainerSpec>,
}

impl ContainerDetails {
    /// Overlays stacked on the first volume mount.
    pub fn post_overlays(&self) -> Option<&[PostOverlay]> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.volume_mounts.first())
            .and_then(|mount| mount.disk.as_ref())
            .map(|disk| disk.post_overlay.as_slice())
    }
}

/// Body of the add/remove post overlay container actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPostOverlayInput {
    pub index: i32,
    pub post_overlay: Vec<PostOverlay>,
    #[serde(default)]
    pub use_lazy: bool,
    #[serde(default)]
    pub clear_layers: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub server_type: String,
    #[serde(default)]
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQuery {
    pub server_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    pub is_auto_alloc: bool,
    pub status: String,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub disk_format: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub min_disk: i64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Metadata sent with an image upload; the file itself travels as the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUploadInput {
    /// Name prefix; the image service appends a suffix when it is taken.
    pub generate_name: String,
    pub disk_format: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// One cached copy of an image on a storage cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCachedImage {
    #[serde(default)]
    pub storagecache_id: String,
    pub cachedimage_id: String,
    #[serde(default)]
    pub status: String,
}

pub const CACHED_IMAGE_STATUS_ACTIVE: &str = "active";

/// Body of `POST /cachedimages/cache-image`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheImageInput {
    pub image_id: String,
    pub auto_cache: bool,
    pub host_type: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_post_overlays() {
        let ctr: ContainerDetails = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "status": "running",
            "spec": {"volume_mounts": [{"type": "disk", "mount_path": "/root/.ollama", "disk": {
                "index": 0,
                "post_overlay": [{"container_target_dir": "/root/.ollama/models/blobs", "image": {"id": "img"}}]
            }}]}
        }))
        .unwrap();
        let overlays = ctr.post_overlays().unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].image.as_ref().unwrap().id, "img");
    }

    #[test]
    fn test_final_container_status() {
        assert!(container_status::is_final("running"));
        assert!(!container_status::is_final("creating"));
    }
}
