//! Options of the monitor and suggestion commands.

mod alert;
mod alertrecord;
mod commonalert;
mod nodealert;
mod suggestion;
mod unifiedmonitor;

pub use alert::{
    AlertCreateOptions, AlertListOptions, AlertNotificationAttachOptions, AlertUpdateOptions,
};
pub use alertrecord::AlertRecordListOptions;
pub use commonalert::{CommonAlertCreateOptions, CommonAlertListOptions, CommonAlertUpdateOptions};
pub use nodealert::{NodeAlertCreateOptions, NodeAlertListOptions, NodeAlertUpdateOptions};
pub use suggestion::{
    SuggestSysAlertListOptions, SuggestSysRuleCreateOptions, SuggestSysRuleListOptions,
    SuggestSysRuleUpdateOptions,
};
pub use unifiedmonitor::{parse_reducer, MetricQueryOptions};

use crate::mcclient::modules::monitor::helper::AlertQueryWhere;
use crate::mcclient::ClientError;

const WHERE_OPERATORS: [&str; 7] = ["!=", ">=", "<=", "=~", "=", ">", "<"];

/// Split `key<op>value` on its first operator.
pub fn parse_where(expr: &str) -> Result<(String, String, String), ClientError> {
    let invalid = || ClientError::InvalidParameter(format!("invalid where expression {expr:?}"));

    for (idx, _) in expr.char_indices() {
        if let Some(op) = WHERE_OPERATORS.iter().find(|op| expr[idx..].starts_with(**op)) {
            let key = expr[..idx].trim();
            let value = expr[idx + op.len()..].trim();
            if key.is_empty() || value.is_empty() {
                return Err(invalid());
            }
            return Ok((key.to_string(), (*op).to_string(), value.to_string()));
        }
    }
    Err(invalid())
}

/// Append every `key<op>value` expression to `where_`, joined with AND.
pub fn apply_where(where_: &mut AlertQueryWhere, exprs: &[String]) -> Result<(), ClientError> {
    for expr in exprs {
        let (key, op, value) = parse_where(expr)?;
        where_.filter(&key, &op, value);
    }
    Ok(())
}
