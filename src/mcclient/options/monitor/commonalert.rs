use clap::Args;
use serde::Serialize;

use super::apply_where;
use crate::domain::models::monitor::{
    CommonAlertCreateInput, CommonAlertQuery, CommonAlertUpdateInput, CommonMetricInputQuery,
};
use crate::mcclient::modules::monitor::helper::AlertQuery;
use crate::mcclient::options::{BaseListOptions, OptionParams};
use crate::mcclient::ClientError;

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct CommonAlertListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    /// system or normal
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
}

impl OptionParams for CommonAlertListOptions {}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonAlertCreateOptions {
    /// Alert name
    pub name: String,
    pub measurement: String,
    pub field: String,
    /// gt or lt
    pub comparator: String,
    pub threshold: f64,
    #[arg(long, default_value = "telegraf")]
    pub database: String,
    /// Reducer name, e.g. avg
    #[arg(long, default_value = "avg")]
    pub reduce: String,
    #[arg(long, default_value = "5m")]
    pub from: String,
    /// Tag filter key=value, repeatable
    #[arg(long = "where")]
    pub where_: Vec<String>,
    /// Evaluation period, e.g. 5m
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub silent_period: Option<String>,
    #[arg(long)]
    pub level: Option<String>,
    /// Notify channel, repeatable
    #[arg(long)]
    pub channel: Vec<String>,
    /// Notified user, repeatable
    #[arg(long)]
    pub recipients: Vec<String>,
    #[arg(long)]
    pub scope: Option<String>,
    #[arg(long)]
    pub alert_type: Option<String>,
    /// e.g. percent
    #[arg(long)]
    pub field_opt: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Create the alert disabled
    #[arg(long)]
    pub disable: bool,
}

impl CommonAlertCreateOptions {
    pub fn to_input(&self) -> Result<CommonAlertCreateInput, ClientError> {
        let mut query = AlertQuery::new(&self.database, &self.measurement);
        query.from(&self.from);
        apply_where(query.where_(), &self.where_)?;
        query.selects().select(&self.field);

        Ok(CommonAlertCreateInput {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            level: self.level.clone().unwrap_or_default(),
            period: self.period.clone().unwrap_or_default(),
            silent_period: self.silent_period.clone().unwrap_or_default(),
            channel: self.channel.clone(),
            recipients: self.recipients.clone(),
            common_metric_input_query: CommonMetricInputQuery {
                metric_query: vec![CommonAlertQuery {
                    query: query.to_alert_query(),
                    reduce: self.reduce.clone(),
                    comparator: self.comparator.clone(),
                    threshold: self.threshold,
                    field_opt: self.field_opt.clone().unwrap_or_default(),
                }],
            },
            scope: self.scope.clone().unwrap_or_default(),
            alert_type: self.alert_type.clone().unwrap_or_default(),
            enabled: Some(!self.disable),
        })
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonAlertUpdateOptions {
    /// Common alert id or name
    pub id: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub period: Option<String>,
    #[arg(long)]
    pub silent_period: Option<String>,
    #[arg(long)]
    pub channel: Vec<String>,
    #[arg(long)]
    pub recipients: Vec<String>,
}

impl CommonAlertUpdateOptions {
    pub fn to_input(&self) -> CommonAlertUpdateInput {
        CommonAlertUpdateInput {
            description: self.description.clone(),
            level: self.level.clone(),
            period: self.period.clone(),
            silent_period: self.silent_period.clone(),
            channel: self.channel.clone(),
            recipients: self.recipients.clone(),
            common_metric_input_query: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_alert_input() {
        let opts = CommonAlertCreateOptions {
            name: "mem".into(),
            measurement: "mem".into(),
            field: "used_percent".into(),
            comparator: "gt".into(),
            threshold: 90.0,
            database: "telegraf".into(),
            reduce: "avg".into(),
            from: "5m".into(),
            where_: vec!["host_id=h1".into()],
            channel: vec!["email".into()],
            ..Default::default()
        };
        let input = opts.to_input().unwrap();
        let value = serde_json::to_value(&input).unwrap();
        let query = &value["common_metric_input_query"]["metric_query"][0];

        assert_eq!(query["reduce"], "avg");
        assert_eq!(query["comparator"], "gt");
        assert_eq!(query["from"], "5m");
        assert_eq!(query["model"]["measurement"], "mem");
        assert_eq!(query["model"]["tags"][0]["key"], "host_id");
        assert_eq!(value["channel"], serde_json::json!(["email"]));
        assert_eq!(value["enabled"], true);
    }
}
