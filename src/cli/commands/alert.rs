//! `monitor-alert-*` commands.

use anyhow::{Context, Result};

use super::{create, delete, list, perform, show, update};
use crate::cli::output::CommandResult;
use crate::cli::types::AlertCommands;
use crate::mcclient::modules::monitor::{attach_notification, ALERTS};
use crate::mcclient::options::OptionParams;
use crate::mcclient::Session;

pub async fn execute(command: AlertCommands, session: &Session) -> Result<CommandResult> {
    match command {
        AlertCommands::List(opts) => list(&ALERTS, session, &opts).await,
        AlertCommands::Show(opts) => show(&ALERTS, session, &opts.id).await,
        AlertCommands::Create(opts) => {
            let input = opts.to_input()?;
            create(&ALERTS, session, &input).await
        }
        AlertCommands::Update(opts) => {
            let input = opts.to_input()?;
            update(&ALERTS, session, &opts.id, &input).await
        }
        AlertCommands::Delete(opts) => Ok(delete(&ALERTS, session, &opts.ids).await),
        AlertCommands::Enable(opts) => Ok(perform(&ALERTS, session, &opts.ids, "enable").await),
        AlertCommands::Disable(opts) => Ok(perform(&ALERTS, session, &opts.ids, "disable").await),
        AlertCommands::NotificationAttach(opts) => {
            let body = opts.params()?;
            let joint = attach_notification(session, &opts.alert, &opts.notification, &body)
                .await
                .with_context(|| format!("Failed to attach notification {} to alert {}", opts.notification, opts.alert))?;
            Ok(CommandResult::Object(joint))
        }
    }
}
