use clap::Args;

use super::apply_where;
use crate::domain::models::monitor::{Condition, MetricQueryInput};
use crate::mcclient::modules::monitor::helper::AlertQuery;
use crate::mcclient::ClientError;

/// Parse a reducer given as `name` or `name(p1, p2, ...)`.
pub fn parse_reducer(s: &str) -> Result<Condition, ClientError> {
    let s = s.trim();
    let invalid = |why: &str| ClientError::InvalidParameter(format!("invalid reducer {s:?}: {why}"));

    let (name, params) = match (s.find('('), s.rfind(')')) {
        (None, None) => (s, None),
        (Some(open), Some(close))
            if close == s.len() - 1 && open < close && s.matches('(').count() == 1 && s.matches(')').count() == 1 =>
        {
            (&s[..open], Some(&s[open + 1..close]))
        }
        _ => return Err(invalid("unbalanced parentheses")),
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("bad name"));
    }

    let params = match params.map(str::trim) {
        None | Some("") => Vec::new(),
        Some(inner) => inner
            .split(',')
            .map(|p| p.trim().parse::<f64>().map_err(|_| invalid("params must be numbers")))
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Condition::new(name, params))
}

/// Options of `unifiedmonitor-query`.
#[derive(Args, Debug, Clone, Default)]
pub struct MetricQueryOptions {
    pub measurement: String,
    /// Field to select, repeatable
    #[arg(long, required = true)]
    pub field: Vec<String>,
    #[arg(long, default_value = "telegraf")]
    pub database: String,
    /// Tag filter key=value, repeatable
    #[arg(long = "where")]
    pub where_: Vec<String>,
    /// Tag to group by, repeatable
    #[arg(long)]
    pub group_by: Vec<String>,
    /// Aggregate every selected field with this function, e.g. mean
    #[arg(long)]
    pub aggregate: Option<String>,
    #[arg(long, default_value = "1h")]
    pub from: String,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub interval: Option<String>,
    #[arg(long)]
    pub scope: Option<String>,
    /// Reduce each series, e.g. avg or percentile(95)
    #[arg(long)]
    pub reducer: Option<String>,
    #[arg(long)]
    pub skip_check_series: bool,
}

impl MetricQueryOptions {
    pub fn parse_reducer(s: &str) -> Result<Condition, ClientError> {
        parse_reducer(s)
    }

    pub fn to_input(&self) -> Result<MetricQueryInput, ClientError> {
        let mut query = AlertQuery::new(&self.database, &self.measurement);
        if let Some(interval) = &self.interval {
            query.interval(interval);
        }
        for tag in &self.group_by {
            query.group_by(tag);
        }
        apply_where(query.where_(), &self.where_)?;
        for field in &self.field {
            let select = query.selects().select(field);
            match self.aggregate.as_deref() {
                None => {}
                Some("mean") => {
                    select.mean();
                }
                Some("sum") => {
                    select.sum();
                }
                Some("max") => {
                    select.max();
                }
                Some("min") => {
                    select.min();
                }
                Some("count") => {
                    select.count();
                }
                Some("last") => {
                    select.last();
                }
                Some(other) => {
                    return Err(ClientError::InvalidParameter(format!("unknown aggregate {other}")))
                }
            }
        }

        Ok(MetricQueryInput {
            from: self.from.clone(),
            to: self.to.clone().unwrap_or_default(),
            interval: self.interval.clone().unwrap_or_default(),
            metric_query: vec![query.to_alert_query()],
            scope: self.scope.clone().unwrap_or_default(),
            reducer: self.reducer.as_deref().map(parse_reducer).transpose()?,
            skip_check_series: self.skip_check_series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_reducer() {
        let cond = parse_reducer("avg").unwrap();
        assert_eq!(serde_json::to_value(&cond).unwrap(), json!({"type": "avg"}));
    }

    #[test]
    fn test_parse_reducer_with_params() {
        let cond = MetricQueryOptions::parse_reducer("percentile(95)").unwrap();
        assert_eq!(cond.condition_type, "percentile");
        assert_eq!(cond.params, vec![95.0]);

        let cond = parse_reducer(" topk( 3 , 0.5 ) ").unwrap();
        assert_eq!(cond.condition_type, "topk");
        assert_eq!(cond.params, vec![3.0, 0.5]);
    }

    #[test]
    fn test_parse_reducer_errors() {
        for bad in ["", "(95)", "percentile(95", "percentile95)", "percentile(a)", "p((1))", "p(1)x"] {
            assert!(parse_reducer(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_query_input() {
        let opts = MetricQueryOptions {
            measurement: "cpu".into(),
            field: vec!["usage_active".into()],
            database: "telegraf".into(),
            aggregate: Some("mean".into()),
            from: "1h".into(),
            interval: Some("5m".into()),
            reducer: Some("max".into()),
            ..Default::default()
        };
        let input = opts.to_input().unwrap();
        assert_eq!(input.metric_query[0].model.selects[0].len(), 2);
        assert_eq!(input.metric_query[0].model.interval, "5m");
        assert_eq!(input.reducer.unwrap().condition_type, "max");
    }
}
