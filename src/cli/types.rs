//! climc command line definitions.

use clap::{Parser, Subcommand};

use crate::mcclient::options::monitor::{
    AlertCreateOptions, AlertListOptions, AlertNotificationAttachOptions, AlertRecordListOptions,
    AlertUpdateOptions, CommonAlertCreateOptions, CommonAlertListOptions, CommonAlertUpdateOptions,
    MetricQueryOptions, NodeAlertCreateOptions, NodeAlertListOptions, NodeAlertUpdateOptions,
    SuggestSysAlertListOptions, SuggestSysRuleCreateOptions, SuggestSysRuleListOptions,
    SuggestSysRuleUpdateOptions,
};
use crate::mcclient::options::{ResourceIdOptions, ResourceIdsOptions};

#[derive(Parser, Debug)]
#[command(name = "climc")]
#[command(about = "OneCloud monitor and alert client", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Monitor service endpoint
    #[arg(long, global = true, env = "CLIMC_MONITOR_URL", default_value = "http://127.0.0.1:30093")]
    pub endpoint: String,

    /// Auth token sent as X-Auth-Token
    #[arg(long, global = true, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Alert(AlertCommands),
    #[command(flatten)]
    NodeAlert(NodeAlertCommands),
    #[command(flatten)]
    CommonAlert(CommonAlertCommands),
    #[command(flatten)]
    AlertRecord(AlertRecordCommands),
    #[command(flatten)]
    UnifiedMonitor(UnifiedMonitorCommands),
    #[command(flatten)]
    Suggestion(SuggestionCommands),
}

#[derive(Subcommand, Debug)]
pub enum AlertCommands {
    /// List alerts
    #[command(name = "monitor-alert-list")]
    List(AlertListOptions),
    /// Show alert details
    #[command(name = "monitor-alert-show")]
    Show(ResourceIdOptions),
    /// Create a threshold alert on one metric
    #[command(name = "monitor-alert-create")]
    Create(AlertCreateOptions),
    /// Update an alert
    #[command(name = "monitor-alert-update")]
    Update(AlertUpdateOptions),
    /// Delete alerts
    #[command(name = "monitor-alert-delete")]
    Delete(ResourceIdsOptions),
    /// Enable alerts
    #[command(name = "monitor-alert-enable")]
    Enable(ResourceIdsOptions),
    /// Disable alerts
    #[command(name = "monitor-alert-disable")]
    Disable(ResourceIdsOptions),
    /// Attach a notification to an alert
    #[command(name = "monitor-alert-notification-attach")]
    NotificationAttach(AlertNotificationAttachOptions),
}

#[derive(Subcommand, Debug)]
pub enum NodeAlertCommands {
    /// List node alerts
    #[command(name = "nodealert-list")]
    List(NodeAlertListOptions),
    /// Show node alert details
    #[command(name = "nodealert-show")]
    Show(ResourceIdOptions),
    /// Create an alert on a guest or host
    #[command(name = "nodealert-create")]
    Create(NodeAlertCreateOptions),
    /// Update a node alert
    #[command(name = "nodealert-update")]
    Update(NodeAlertUpdateOptions),
    /// Delete node alerts
    #[command(name = "nodealert-delete")]
    Delete(ResourceIdsOptions),
    /// Enable node alerts
    #[command(name = "nodealert-enable")]
    Enable(ResourceIdsOptions),
    /// Disable node alerts
    #[command(name = "nodealert-disable")]
    Disable(ResourceIdsOptions),
}

#[derive(Subcommand, Debug)]
pub enum CommonAlertCommands {
    /// List common alerts
    #[command(name = "commonalert-list")]
    List(CommonAlertListOptions),
    /// Show common alert details
    #[command(name = "commonalert-show")]
    Show(ResourceIdOptions),
    /// Create a common alert
    #[command(name = "commonalert-create")]
    Create(CommonAlertCreateOptions),
    /// Update a common alert
    #[command(name = "commonalert-update")]
    Update(CommonAlertUpdateOptions),
    /// Delete common alerts
    #[command(name = "commonalert-delete")]
    Delete(ResourceIdsOptions),
    /// Enable common alerts
    #[command(name = "commonalert-enable")]
    Enable(ResourceIdsOptions),
    /// Disable common alerts
    #[command(name = "commonalert-disable")]
    Disable(ResourceIdsOptions),
}

#[derive(Subcommand, Debug)]
pub enum AlertRecordCommands {
    /// List alert records
    #[command(name = "alertrecord-list")]
    List(AlertRecordListOptions),
    /// Show an alert record
    #[command(name = "alertrecord-show")]
    Show(ResourceIdOptions),
}

#[derive(Subcommand, Debug)]
pub enum UnifiedMonitorCommands {
    /// Query metrics
    #[command(name = "unifiedmonitor-query")]
    Query(MetricQueryOptions),
}

#[derive(Subcommand, Debug)]
pub enum SuggestionCommands {
    /// List suggestion rules
    #[command(name = "suggestsysrule-list")]
    RuleList(SuggestSysRuleListOptions),
    /// Show a suggestion rule
    #[command(name = "suggestsysrule-show")]
    RuleShow(ResourceIdOptions),
    /// Create a suggestion rule
    #[command(name = "suggestsysrule-create")]
    RuleCreate(SuggestSysRuleCreateOptions),
    /// Update a suggestion rule
    #[command(name = "suggestsysrule-update")]
    RuleUpdate(SuggestSysRuleUpdateOptions),
    /// Delete suggestion rules
    #[command(name = "suggestsysrule-delete")]
    RuleDelete(ResourceIdsOptions),
    /// Enable suggestion rules
    #[command(name = "suggestsysrule-enable")]
    RuleEnable(ResourceIdsOptions),
    /// Disable suggestion rules
    #[command(name = "suggestsysrule-disable")]
    RuleDisable(ResourceIdsOptions),
    /// List suggested alerts
    #[command(name = "suggestsysalert-list")]
    AlertList(SuggestSysAlertListOptions),
    /// Show a suggested alert
    #[command(name = "suggestsysalert-show")]
    AlertShow(ResourceIdOptions),
    /// Delete suggested alerts
    #[command(name = "suggestsysalert-delete")]
    AlertDelete(ResourceIdsOptions),
}
