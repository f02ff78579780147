use clap::Args;
use serde::Serialize;

use crate::mcclient::options::{BaseListOptions, OptionParams};

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct AlertRecordListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// ok, alerting or no_data
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_type: Option<String>,
}

impl OptionParams for AlertRecordListOptions {}
