use clap::Args;
use serde::Serialize;

use super::{apply_where, parse_reducer};
use crate::domain::models::monitor::{AlertCreateInput, AlertUpdateInput};
use crate::mcclient::modules::monitor::helper::AlertConfig;
use crate::mcclient::options::{BaseListOptions, OptionParams};
use crate::mcclient::ClientError;

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct AlertListOptions {
    #[command(flatten)]
    #[serde(flatten)]
    pub base: BaseListOptions,
    /// Only enabled (true) or disabled (false) alerts
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Filter by consumer
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<String>,
}

impl OptionParams for AlertListOptions {}

#[derive(Args, Debug, Clone)]
pub struct AlertCreateOptions {
    /// Alert name
    pub name: String,
    /// Measurement to watch, e.g. cpu
    pub measurement: String,
    /// Field of the measurement, e.g. usage_active
    pub field: String,
    /// gt or lt
    pub comparator: String,
    pub threshold: f64,
    /// Metric database
    #[arg(long, default_value = "telegraf")]
    pub database: String,
    /// Evaluation frequency, e.g. 5m
    #[arg(long, default_value = "5m")]
    pub frequency: String,
    /// Query window start
    #[arg(long, default_value = "5m")]
    pub from: String,
    /// Reducer, e.g. avg or percentile(95)
    #[arg(long, default_value = "avg")]
    pub reducer: String,
    /// Tag filter key=value, repeatable
    #[arg(long = "where")]
    pub where_: Vec<String>,
    /// Tag to group by, repeatable
    #[arg(long)]
    pub group_by: Vec<String>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Create the alert disabled
    #[arg(long)]
    pub disable: bool,
}

impl AlertCreateOptions {
    pub fn to_alert_config(&self) -> Result<AlertConfig, ClientError> {
        let mut conf = AlertConfig::new(&self.name, &self.frequency, !self.disable)?;
        if let Some(level) = &self.level {
            conf.level(level);
        }
        if let Some(description) = &self.description {
            conf.description(description);
        }

        let reducer = parse_reducer(&self.reducer)?;
        let cond = conf.condition(&self.database, &self.measurement);
        cond.reducer(reducer);
        match self.comparator.as_str() {
            "gt" | ">" => cond.gt(self.threshold),
            "lt" | "<" => cond.lt(self.threshold),
            other => {
                return Err(ClientError::InvalidParameter(format!(
                    "comparator must be gt or lt, got {other}"
                )))
            }
        };

        let query = cond.query();
        query.from(&self.from);
        for tag in &self.group_by {
            query.group_by(tag);
        }
        apply_where(query.where_(), &self.where_)?;
        query.selects().select(&self.field);
        Ok(conf)
    }

    pub fn to_input(&self) -> Result<AlertCreateInput, ClientError> {
        Ok(self.to_alert_config()?.to_alert_create_input())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct AlertUpdateOptions {
    /// Alert id or name
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Evaluation frequency, e.g. 5m
    #[arg(long)]
    pub frequency: Option<String>,
    #[arg(long)]
    pub level: Option<String>,
    #[arg(long)]
    pub no_data_state: Option<String>,
    #[arg(long)]
    pub execution_error_state: Option<String>,
}

impl AlertUpdateOptions {
    pub fn to_input(&self) -> Result<AlertUpdateInput, ClientError> {
        let frequency = self
            .frequency
            .as_deref()
            .map(crate::mcclient::modules::monitor::helper::parse_frequency)
            .transpose()?;
        Ok(AlertUpdateInput {
            name: self.name.clone(),
            description: self.description.clone(),
            frequency,
            level: self.level.clone(),
            no_data_state: self.no_data_state.clone(),
            execution_error_state: self.execution_error_state.clone(),
            ..Default::default()
        })
    }
}

#[derive(Args, Debug, Clone, Default, Serialize)]
pub struct AlertNotificationAttachOptions {
    /// Alert id
    #[serde(skip)]
    pub alert: String,
    /// Notification id
    #[serde(skip)]
    pub notification: String,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_by: Option<String>,
}

impl OptionParams for AlertNotificationAttachOptions {}
