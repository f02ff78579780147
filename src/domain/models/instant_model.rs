//! Instant models: prebuilt model packages delivered as `tgz` images and
//! mounted into running LLM containers as overlay layers.

use serde::{Deserialize, Serialize};

use crate::domain::models::llm::LlmContainerType;
use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

const MIB: i64 = 1024 * 1024;

/// Catalog entry for an installable model package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantModel {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub llm_type: LlmContainerType,
    #[serde(default)]
    pub model_id: String,
    pub model_name: String,
    pub model_tag: String,
    #[serde(default)]
    pub image_id: String,
    /// Paths inside the container this package provides.
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Image size in bytes.
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub actual_size_mb: i64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_cache: bool,
}

impl_resource!(InstantModel, "instant_models_tbl", "instant_model", "instant_models");

impl InstantModel {
    pub fn actual_size_mb(&self) -> i64 {
        if self.actual_size_mb > 0 {
            self.actual_size_mb
        } else {
            self.size / MIB
        }
    }

    /// Size in decimal GB, the unit quotas are expressed in.
    pub fn actual_size_gb(&self) -> f64 {
        mb_to_gb(self.actual_size_mb())
    }

    /// `name:tag-modelId`, the key volumes and skus record premounts under.
    pub fn full_name(&self) -> String {
        model_full_name(&self.model_name, &self.model_tag, &self.model_id)
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn mb_to_gb(mb: i64) -> f64 {
    mb as f64 * 1024.0 * 1024.0 / 1000.0 / 1000.0 / 1000.0
}

pub fn model_full_name(name: &str, tag: &str, model_id: &str) -> String {
    format!("{name}:{tag}-{model_id}")
}

/// Install state of one model on one LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmInstantModel {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub llm_id: String,
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub tag: String,
    /// Reported by the model server.
    #[serde(default)]
    pub is_probed: bool,
    /// Present as an overlay on the container volume.
    #[serde(default)]
    pub is_mounted: bool,
    /// Shipped with the base image rather than installed.
    #[serde(default)]
    pub is_system: bool,
}

impl_resource!(LlmInstantModel, "llm_instant_models_tbl", "llm_instant_model", "llm_instant_models");

impl LlmInstantModel {
    pub fn full_name(&self) -> String {
        model_full_name(&self.model_name, &self.tag, &self.model_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickModelMethod {
    Install,
    Uninstall,
    Reinstall,
}

impl Default for QuickModelMethod {
    fn default() -> Self {
        Self::Install
    }
}

impl QuickModelMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Reinstall => "reinstall",
        }
    }
}

/// Model reference in a quick-models request: by catalog `id`, or by
/// `model_id` plus optional `tag`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmPerformQuickModelsInput {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub method: Option<QuickModelMethod>,
}

/// Parameters of the instant model sync task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSyncModelTaskInput {
    pub models: Vec<ModelInfo>,
    pub method: QuickModelMethod,
    /// LLM status when the request was accepted; restored afterwards.
    pub llm_status: String,
}

/// Model reported by a running model server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalInstantModelInfo {
    pub model_id: String,
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub size: i64,
}

/// One directory of a model package to overlay into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDirInfo {
    pub image_id: String,
    /// Path inside the package image.
    pub image_path: String,
    pub container_target_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantModelCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub llm_type: String,
    #[serde(default)]
    pub model_id: String,
    pub model_name: String,
    pub model_tag: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Without an image the model is imported from the registry unless set.
    #[serde(default)]
    pub do_not_import: bool,
}

/// Import `model_name:model_tag` from the model registry as a new model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantModelImportInput {
    pub llm_type: String,
    pub model_name: String,
    pub model_tag: String,
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantModelChangeOwnerInput {
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantModelUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_id: Option<String>,
    pub mounts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantModelListInput {
    #[serde(default)]
    pub model_name: Vec<String>,
    #[serde(default)]
    pub model_tag: Vec<String>,
    #[serde(default)]
    pub model_id: Vec<String>,
    pub llm_type: Option<String>,
    pub enabled: Option<bool>,
    pub auto_cache: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstantModelEnableAutoCacheInput {
    pub auto_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountedByLlmInfo {
    pub llm_id: String,
    pub llm_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantModelDetails {
    #[serde(flatten)]
    pub model: InstantModel,
    pub image: String,
    pub cache_count: i64,
    pub cached_count: i64,
    pub mounted_by_llms: Vec<MountedByLlmInfo>,
}
