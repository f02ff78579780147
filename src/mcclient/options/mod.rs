//! Command line option structs.
//!
//! Each struct is both a clap `Args` and a serde `Serialize`; its JSON form
//! is the query or body sent to the service.

pub mod monitor;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use super::ClientError;

/// Turn an option struct into request params.
pub trait OptionParams: Serialize {
    fn params(&self) -> Result<Value, ClientError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Paging and filtering flags shared by every list command.
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct BaseListOptions {
    /// Page size
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    /// Page offset
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    /// Filter by name substring
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Resource scope (system, domain, project)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Ask for extra details
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub details: bool,
    /// Field to order by
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    /// asc or desc
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl OptionParams for BaseListOptions {}

/// One or more resource ids.
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct ResourceIdsOptions {
    /// Resource ids
    #[arg(required = true)]
    #[serde(skip)]
    pub ids: Vec<String>,
}

/// A single resource id.
#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct ResourceIdOptions {
    /// Resource id or name
    #[serde(skip)]
    pub id: String,
}

impl OptionParams for ResourceIdOptions {}
