use clap::Args;
use serde::Serialize;

use crate::domain::models::monitor::{NodeAlertCreateInput, NodeAlertUpdateInput};
use crate::mcclient::options::{BaseListOptions, OptionParams};

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct NodeAlertListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    /// guest or host
    #[arg(long = "node-type")]
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

impl OptionParams for NodeAlertListOptions {}

#[derive(Args, Debug, Clone, Default)]
pub struct NodeAlertCreateOptions {
    /// Alert name
    pub name: String,
    /// Metric, e.g. cpu.usage_active
    pub metric: String,
    /// guest or host
    pub node_type: String,
    /// Id of the guest or host
    pub node_id: String,
    /// gt or lt
    pub comparator: String,
    pub threshold: f64,
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub window: Option<String>,
    /// Notified user, repeatable
    #[arg(long)]
    pub recipients: Vec<String>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub silent_period: Option<String>,
    /// Create the alert disabled
    #[arg(long)]
    pub disable: bool,
}

impl NodeAlertCreateOptions {
    pub fn to_input(&self) -> NodeAlertCreateInput {
        NodeAlertCreateInput {
            name: self.name.clone(),
            metric: self.metric.clone(),
            node_type: self.node_type.clone(),
            node_id: self.node_id.clone(),
            period: self.period.clone().unwrap_or_default(),
            window: self.window.clone().unwrap_or_default(),
            comparator: self.comparator.clone(),
            threshold: self.threshold,
            recipients: self.recipients.clone(),
            level: self.level.clone().unwrap_or_default(),
            channel: self.channel.clone().unwrap_or_default(),
            silent_period: self.silent_period.clone().unwrap_or_default(),
            enabled: Some(!self.disable),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct NodeAlertUpdateOptions {
    /// Node alert id
    pub id: String,
    #[arg(long)]
    pub metric: Option<String>,
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub window: Option<String>,
    #[arg(long)]
    pub comparator: Option<String>,
    #[arg(long)]
    pub threshold: Option<f64>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub recipients: Vec<String>,
}

impl NodeAlertUpdateOptions {
    pub fn to_input(&self) -> NodeAlertUpdateInput {
        NodeAlertUpdateInput {
            metric: self.metric.clone(),
            period: self.period.clone(),
            window: self.window.clone(),
            comparator: self.comparator.clone(),
            threshold: self.threshold,
            level: self.level.clone(),
            channel: self.channel.clone(),
            recipients: self.recipients.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_alert_input() {
        let opts = NodeAlertCreateOptions {
            name: "vm-cpu".into(),
            metric: "cpu.usage_active".into(),
            node_type: "guest".into(),
            node_id: "g1".into(),
            comparator: "gt".into(),
            threshold: 80.0,
            period: Some("5m".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(opts.to_input()).unwrap(),
            json!({
                "name": "vm-cpu",
                "metric": "cpu.usage_active",
                "type": "guest",
                "node_id": "g1",
                "period": "5m",
                "comparator": "gt",
                "threshold": 80.0,
                "enabled": true
            })
        );
    }

    #[test]
    fn test_list_renames_type() {
        let opts = NodeAlertListOptions {
            node_type: Some("host".into()),
            ..Default::default()
        };
        assert_eq!(opts.params().unwrap(), json!({"type": "host"}));
    }
}
