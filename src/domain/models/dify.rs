use serde::{Deserialize, Serialize};

use crate::domain::models::resource::ResourceBase;
use crate::impl_resource;

/// A deployed Dify application stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dify {
    #[serde(flatten)]
    pub base: ResourceBase,
    pub dify_sku_id: String,
    #[serde(default)]
    pub svr_id: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub bandwidth_mb: i64,
    #[serde(default)]
    pub prefer_host: String,
}

impl_resource!(Dify, "difys_tbl", "dify", "difys");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifyCreateInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: String,
    /// Sku id or name.
    pub dify_sku_id: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(default)]
    pub bandwidth_mb: i64,
    #[serde(default)]
    pub prefer_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyListDetails {
    #[serde(flatten)]
    pub dify: Dify,
    pub dify_sku: String,
    pub server: String,
    pub host: String,
    pub host_access_ip: String,
    pub access_url: String,
}
