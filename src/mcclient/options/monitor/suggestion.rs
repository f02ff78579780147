use clap::Args;
use serde::Serialize;

use crate::domain::models::monitor::{SuggestSysRuleCreateInput, SuggestSysRuleUpdateInput};
use crate::mcclient::options::{BaseListOptions, OptionParams};
use crate::mcclient::ClientError;

fn parse_setting(raw: Option<&str>) -> Result<Option<serde_json::Value>, ClientError> {
    raw.map(|s| {
        serde_json::from_str(s)
            .map_err(|e| ClientError::InvalidParameter(format!("setting is not valid JSON: {e}")))
    })
    .transpose()
}

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct SuggestSysRuleListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    /// Rule type, e.g. EIP_UNUSED
    #[arg(long = "type")]
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl OptionParams for SuggestSysRuleListOptions {}

#[derive(Args, Debug, Clone, Default)]
pub struct SuggestSysRuleCreateOptions {
    pub name: String,
    /// Rule type, e.g. EIP_UNUSED
    pub rule_type: String,
    /// Check period, e.g. 12h
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub time_from: Option<String>,
    /// Rule setting as JSON
    #[arg(long)]
    pub setting: Option<String>,
    /// Create the rule disabled
    #[arg(long)]
    pub disable: bool,
}

impl SuggestSysRuleCreateOptions {
    pub fn to_input(&self) -> Result<SuggestSysRuleCreateInput, ClientError> {
        Ok(SuggestSysRuleCreateInput {
            name: self.name.clone(),
            rule_type: self.rule_type.clone(),
            period: self.period.clone().unwrap_or_default(),
            time_from: self.time_from.clone().unwrap_or_default(),
            setting: parse_setting(self.setting.as_deref())?,
            enabled: Some(!self.disable),
        })
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SuggestSysRuleUpdateOptions {
    pub id: String,
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub time_from: Option<String>,
    /// Rule setting as JSON
    #[arg(long)]
    pub setting: Option<String>,
}

impl SuggestSysRuleUpdateOptions {
    pub fn to_input(&self) -> Result<SuggestSysRuleUpdateInput, ClientError> {
        Ok(SuggestSysRuleUpdateInput {
            period: self.period.clone(),
            time_from: self.time_from.clone(),
            setting: parse_setting(self.setting.as_deref())?,
            enabled: None,
        })
    }
}

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct SuggestSysAlertListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    #[arg(long = "type")]
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_id: Option<String>,
}

impl OptionParams for SuggestSysAlertListOptions {}
