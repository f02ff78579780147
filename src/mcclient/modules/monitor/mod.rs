//! Monitor service managers.

pub mod helper;

use serde_json::{json, Value};

use crate::mcclient::{ClientError, ResourceManager, Session};

pub const ALERTS: ResourceManager = ResourceManager::new("alert", "alerts");
pub const NODE_ALERTS: ResourceManager = ResourceManager::new("nodealert", "nodealerts");
pub const COMMON_ALERTS: ResourceManager = ResourceManager::new("commonalert", "commonalerts");
pub const ALERT_RECORDS: ResourceManager = ResourceManager::new("alertrecord", "alertrecords");
pub const ALERT_NOTIFICATIONS: ResourceManager =
    ResourceManager::new("alertnotification", "alertnotifications");
pub const UNIFIED_MONITORS: ResourceManager = ResourceManager::new("unifiedmonitor", "unifiedmonitors");
pub const SUGGEST_SYS_RULES: ResourceManager = ResourceManager::new("suggestsysrule", "suggestsysrules");
pub const SUGGEST_SYS_ALERTS: ResourceManager =
    ResourceManager::new("suggestsysalert", "suggestsysalerts");

/// Attach a notification to an alert through the joint resource
/// `/alerts/<alert>/alertnotifications/<notification>`.
pub async fn attach_notification(
    session: &Session,
    alert_id: &str,
    notification_id: &str,
    body: &Value,
) -> Result<Value, ClientError> {
    let path = format!(
        "/{}/{}/{}/{}",
        ALERTS.keyword_plural, alert_id, ALERT_NOTIFICATIONS.keyword_plural, notification_id
    );
    let body = json!({ ALERT_NOTIFICATIONS.keyword: body });
    let resp = session.post(&path, &body).await?;
    Ok(resp
        .get(ALERT_NOTIFICATIONS.keyword)
        .cloned()
        .unwrap_or(resp))
}

/// Run a unified monitor query.
pub async fn unified_query(session: &Session, body: &Value) -> Result<Value, ClientError> {
    UNIFIED_MONITORS.perform_class_action(session, "query", body).await
}
