//! climc command handlers.
//!
//! Every handler returns a [`CommandResult`]; printing happens in
//! [`crate::cli::run`].

pub mod alert;
pub mod alertrecord;
pub mod commonalert;
pub mod nodealert;
pub mod suggestion;
pub mod unifiedmonitor;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::output::CommandResult;
use crate::cli::types::Commands;
use crate::mcclient::options::OptionParams;
use crate::mcclient::{ResourceManager, Session};

pub async fn execute(command: Commands, session: &Session) -> Result<CommandResult> {
    match command {
        Commands::Alert(cmd) => alert::execute(cmd, session).await,
        Commands::NodeAlert(cmd) => nodealert::execute(cmd, session).await,
        Commands::CommonAlert(cmd) => commonalert::execute(cmd, session).await,
        Commands::AlertRecord(cmd) => alertrecord::execute(cmd, session).await,
        Commands::UnifiedMonitor(cmd) => unifiedmonitor::execute(cmd, session).await,
        Commands::Suggestion(cmd) => suggestion::execute(cmd, session).await,
    }
}

pub(crate) async fn list<P: OptionParams>(
    manager: &ResourceManager,
    session: &Session,
    opts: &P,
) -> Result<CommandResult> {
    let params = opts.params()?;
    let result = manager
        .list(session, &params)
        .await
        .with_context(|| format!("Failed to list {}", manager.keyword_plural))?;
    Ok(CommandResult::List(result))
}

pub(crate) async fn show(manager: &ResourceManager, session: &Session, id: &str) -> Result<CommandResult> {
    let obj = manager
        .get(session, id, &json!({}))
        .await
        .with_context(|| format!("Failed to get {} {id}", manager.keyword))?;
    Ok(CommandResult::Object(obj))
}

pub(crate) async fn create<B: Serialize>(
    manager: &ResourceManager,
    session: &Session,
    input: &B,
) -> Result<CommandResult> {
    let body = serde_json::to_value(input)?;
    let obj = manager
        .create(session, &body)
        .await
        .with_context(|| format!("Failed to create {}", manager.keyword))?;
    Ok(CommandResult::Object(obj))
}

pub(crate) async fn update<B: Serialize>(
    manager: &ResourceManager,
    session: &Session,
    id: &str,
    input: &B,
) -> Result<CommandResult> {
    let body = serde_json::to_value(input)?;
    let obj = manager
        .update(session, id, &body)
        .await
        .with_context(|| format!("Failed to update {} {id}", manager.keyword))?;
    Ok(CommandResult::Object(obj))
}

pub(crate) async fn delete(manager: &ResourceManager, session: &Session, ids: &[String]) -> CommandResult {
    CommandResult::Batch(manager.batch_delete(session, ids, &Value::Null).await)
}

/// Run `enable` or `disable` against every id.
pub(crate) async fn perform(
    manager: &ResourceManager,
    session: &Session,
    ids: &[String],
    action: &str,
) -> CommandResult {
    CommandResult::Batch(
        manager
            .batch_perform_action(session, ids, action, &json!({}))
            .await,
    )
}

#[cfg(test)]
pub(crate) fn test_session(server: &mockito::ServerGuard) -> Session {
    Session::new(server.url(), Some("token".into()), std::time::Duration::from_secs(5))
        .expect("session")
}
