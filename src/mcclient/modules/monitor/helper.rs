//! Fluent builders for alert definitions.
//!
//! ```ignore
//! let mut conf = AlertConfig::new("cpu-high", "5m", true)?;
//! let cond = conf.condition("telegraf", "cpu").avg().gt(80.0);
//! let q = cond.query().from("10m");
//! q.where_().equal("hostname", "server1").or().equal("hostname", "server2");
//! q.selects().select("usage_active").mean();
//! let input = conf.to_alert_create_input();
//! ```

use crate::domain::models::monitor as api;
use crate::mcclient::ClientError;

/// Parse an alert frequency (`30s`, `5m`, `1h`, `1d` or plain seconds) into seconds.
pub fn parse_frequency(s: &str) -> Result<i64, ClientError> {
    let s = s.trim();
    let invalid = || ClientError::InvalidParameter(format!("invalid frequency {s:?}"));
    if s.is_empty() {
        return Err(invalid());
    }

    let (digits, unit) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], Some(c)),
        _ => (s, None),
    };
    let value: i64 = digits.parse().map_err(|_| invalid())?;
    let scale = match unit {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 3600,
        Some('d') => 86_400,
        Some(_) => return Err(invalid()),
    };
    if value <= 0 {
        return Err(invalid());
    }
    Ok(value * scale)
}

#[derive(Debug, Clone, Default)]
pub struct AlertConfig {
    name: String,
    description: String,
    frequency: i64,
    enabled: bool,
    level: String,
    no_data_state: String,
    execution_error_state: String,
    used_by: String,
    conditions: Vec<AlertCondition>,
}

impl AlertConfig {
    pub fn new(name: &str, frequency: &str, enabled: bool) -> Result<Self, ClientError> {
        Ok(Self {
            name: name.to_string(),
            frequency: parse_frequency(frequency)?,
            enabled,
            ..Default::default()
        })
    }

    pub fn description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }

    pub fn level(&mut self, level: &str) -> &mut Self {
        self.level = level.to_string();
        self
    }

    pub fn no_data_state(&mut self, state: &str) -> &mut Self {
        self.no_data_state = state.to_string();
        self
    }

    pub fn execution_error_state(&mut self, state: &str) -> &mut Self {
        self.execution_error_state = state.to_string();
        self
    }

    pub fn used_by(&mut self, used_by: &str) -> &mut Self {
        self.used_by = used_by.to_string();
        self
    }

    /// Append a condition over `database.measurement` and return it for editing.
    pub fn condition(&mut self, database: &str, measurement: &str) -> &mut AlertCondition {
        self.conditions.push(AlertCondition::new(database, measurement));
        let last = self.conditions.len() - 1;
        &mut self.conditions[last]
    }

    fn settings(&self) -> api::AlertSetting {
        api::AlertSetting {
            conditions: self.conditions.iter().map(AlertCondition::to_condition).collect(),
        }
    }

    pub fn to_alert_create_input(&self) -> api::AlertCreateInput {
        api::AlertCreateInput {
            name: self.name.clone(),
            description: self.description.clone(),
            frequency: self.frequency,
            settings: self.settings(),
            enabled: Some(self.enabled),
            level: self.level.clone(),
            no_data_state: self.no_data_state.clone(),
            execution_error_state: self.execution_error_state.clone(),
            used_by: self.used_by.clone(),
        }
    }

    pub fn to_alert_update_input(&self) -> api::AlertUpdateInput {
        let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
        api::AlertUpdateInput {
            name: non_empty(&self.name),
            description: non_empty(&self.description),
            frequency: Some(self.frequency),
            settings: (!self.conditions.is_empty()).then(|| self.settings()),
            enabled: Some(self.enabled),
            level: non_empty(&self.level),
            no_data_state: non_empty(&self.no_data_state),
            execution_error_state: non_empty(&self.execution_error_state),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertCondition {
    query: AlertQuery,
    reducer: api::Condition,
    evaluator: api::Condition,
    operator: String,
}

impl AlertCondition {
    pub fn new(database: &str, measurement: &str) -> Self {
        Self {
            query: AlertQuery::new(database, measurement),
            reducer: api::Condition::new("avg", Vec::new()),
            evaluator: api::Condition::new("no_value", Vec::new()),
            operator: "and".to_string(),
        }
    }

    /// Use an already built reducer, e.g. one parsed from the command line.
    pub fn reducer(&mut self, reducer: api::Condition) -> &mut Self {
        self.reducer = reducer;
        self
    }

    fn reduce(&mut self, kind: &str, params: Vec<f64>) -> &mut Self {
        self.reducer = api::Condition::new(kind, params);
        self
    }

    pub fn avg(&mut self) -> &mut Self {
        self.reduce("avg", Vec::new())
    }

    pub fn sum(&mut self) -> &mut Self {
        self.reduce("sum", Vec::new())
    }

    pub fn min(&mut self) -> &mut Self {
        self.reduce("min", Vec::new())
    }

    pub fn max(&mut self) -> &mut Self {
        self.reduce("max", Vec::new())
    }

    pub fn count(&mut self) -> &mut Self {
        self.reduce("count", Vec::new())
    }

    pub fn last(&mut self) -> &mut Self {
        self.reduce("last", Vec::new())
    }

    pub fn median(&mut self) -> &mut Self {
        self.reduce("median", Vec::new())
    }

    pub fn percentile(&mut self, n: f64) -> &mut Self {
        self.reduce("percentile", vec![n])
    }

    fn evaluate(&mut self, kind: &str, params: Vec<f64>) -> &mut Self {
        self.evaluator = api::Condition::new(kind, params);
        self
    }

    pub fn gt(&mut self, threshold: f64) -> &mut Self {
        self.evaluate("gt", vec![threshold])
    }

    pub fn lt(&mut self, threshold: f64) -> &mut Self {
        self.evaluate("lt", vec![threshold])
    }

    pub fn within_range(&mut self, low: f64, high: f64) -> &mut Self {
        self.evaluate("within_range", vec![low, high])
    }

    pub fn outside_range(&mut self, low: f64, high: f64) -> &mut Self {
        self.evaluate("outside_range", vec![low, high])
    }

    pub fn no_value(&mut self) -> &mut Self {
        self.evaluate("no_value", Vec::new())
    }

    /// Combine with the previous condition using AND.
    pub fn and(&mut self) -> &mut Self {
        self.operator = "and".to_string();
        self
    }

    pub fn or(&mut self) -> &mut Self {
        self.operator = "or".to_string();
        self
    }

    pub fn query(&mut self) -> &mut AlertQuery {
        &mut self.query
    }

    pub fn to_condition(&self) -> api::AlertCondition {
        api::AlertCondition {
            condition_type: "query".to_string(),
            query: self.query.to_alert_query(),
            reducer: self.reducer.clone(),
            evaluator: self.evaluator.clone(),
            operator: self.operator.clone(),
            reducer_order: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    database: String,
    measurement: String,
    from: String,
    to: String,
    interval: String,
    selects: AlertQuerySelects,
    where_: AlertQueryWhere,
    group_by: Vec<String>,
}

impl AlertQuery {
    pub fn new(database: &str, measurement: &str) -> Self {
        Self {
            database: database.to_string(),
            measurement: measurement.to_string(),
            ..Default::default()
        }
    }

    pub fn from(&mut self, from: &str) -> &mut Self {
        self.from = from.to_string();
        self
    }

    pub fn to(&mut self, to: &str) -> &mut Self {
        self.to = to.to_string();
        self
    }

    pub fn interval(&mut self, interval: &str) -> &mut Self {
        self.interval = interval.to_string();
        self
    }

    pub fn selects(&mut self) -> &mut AlertQuerySelects {
        &mut self.selects
    }

    pub fn where_(&mut self) -> &mut AlertQueryWhere {
        &mut self.where_
    }

    pub fn group_by(&mut self, tag: &str) -> &mut Self {
        self.group_by.push(tag.to_string());
        self
    }

    pub fn to_metric_query(&self) -> api::MetricQuery {
        api::MetricQuery {
            database: self.database.clone(),
            measurement: self.measurement.clone(),
            tags: self.where_.to_tags(),
            group_by: self
                .group_by
                .iter()
                .map(|tag| api::MetricQueryPart::new("tag", &[tag.as_str()]))
                .collect(),
            selects: self.selects.to_selects(),
            interval: self.interval.clone(),
            ..Default::default()
        }
    }

    pub fn to_alert_query(&self) -> api::AlertQuery {
        api::AlertQuery {
            model: self.to_metric_query(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertQuerySelects {
    selects: Vec<AlertQuerySelect>,
}

impl AlertQuerySelects {
    /// Start a new select over `field`.
    pub fn select(&mut self, field: &str) -> &mut AlertQuerySelect {
        self.selects.push(AlertQuerySelect::new(field));
        let last = self.selects.len() - 1;
        &mut self.selects[last]
    }

    pub fn to_selects(&self) -> Vec<api::MetricQuerySelect> {
        self.selects.iter().map(|s| s.parts.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct AlertQuerySelect {
    parts: Vec<api::MetricQueryPart>,
}

impl AlertQuerySelect {
    fn new(field: &str) -> Self {
        Self {
            parts: vec![api::MetricQueryPart::new("field", &[field])],
        }
    }

    fn part(&mut self, kind: &str, params: &[&str]) -> &mut Self {
        self.parts.push(api::MetricQueryPart::new(kind, params));
        self
    }

    pub fn mean(&mut self) -> &mut Self {
        self.part("mean", &[])
    }

    pub fn sum(&mut self) -> &mut Self {
        self.part("sum", &[])
    }

    pub fn max(&mut self) -> &mut Self {
        self.part("max", &[])
    }

    pub fn min(&mut self) -> &mut Self {
        self.part("min", &[])
    }

    pub fn count(&mut self) -> &mut Self {
        self.part("count", &[])
    }

    pub fn last(&mut self) -> &mut Self {
        self.part("last", &[])
    }

    pub fn percentile(&mut self, n: f64) -> &mut Self {
        self.part("percentile", &[n.to_string().as_str()])
    }

    /// Arithmetic on the selected value, e.g. `math("/", 1024)`.
    pub fn math(&mut self, op: &str, value: impl ToString) -> &mut Self {
        let expr = format!("{op} {}", value.to_string());
        self.part("math", &[expr.as_str()])
    }

    pub fn alias(&mut self, name: &str) -> &mut Self {
        self.part("alias", &[name])
    }
}

/// Ordered tag filters.
///
/// The first tag has no condition. Every later tag is joined with `AND`
/// unless `or()` was called right before it.
#[derive(Debug, Clone, Default)]
pub struct AlertQueryWhere {
    tags: Vec<api::MetricQueryTag>,
    next_condition: Option<String>,
}

impl AlertQueryWhere {
    fn add(&mut self, key: &str, operator: &str, value: String) -> &mut Self {
        let condition = if self.tags.is_empty() {
            String::new()
        } else {
            self.next_condition.take().unwrap_or_else(|| "AND".to_string())
        };
        self.next_condition = None;
        self.tags.push(api::MetricQueryTag {
            key: key.to_string(),
            operator: operator.to_string(),
            value,
            condition,
        });
        self
    }

    pub fn equal(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, "=", value.to_string())
    }

    pub fn not_equal(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, "!=", value.to_string())
    }

    pub fn gt(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, ">", value.to_string())
    }

    pub fn lt(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, "<", value.to_string())
    }

    pub fn ge(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, ">=", value.to_string())
    }

    pub fn le(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.add(key, "<=", value.to_string())
    }

    /// Append a tag with an explicit operator.
    pub fn filter(&mut self, key: &str, operator: &str, value: impl ToString) -> &mut Self {
        self.add(key, operator, value.to_string())
    }

    /// Match any of `values` through an anchored regex.
    pub fn in_(&mut self, key: &str, values: &[&str]) -> &mut Self {
        self.add(key, "=~", format!("/^({})$/", values.join("|")))
    }

    pub fn and(&mut self) -> &mut Self {
        self.next_condition = Some("AND".to_string());
        self
    }

    pub fn or(&mut self) -> &mut Self {
        self.next_condition = Some("OR".to_string());
        self
    }

    pub fn to_tags(&self) -> Vec<api::MetricQueryTag> {
        self.tags.clone()
    }
}
