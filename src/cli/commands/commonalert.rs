//! `commonalert-*` commands.

use anyhow::Result;

use super::{create, delete, list, perform, show, update};
use crate::cli::output::CommandResult;
use crate::cli::types::CommonAlertCommands;
use crate::mcclient::modules::monitor::COMMON_ALERTS;
use crate::mcclient::Session;

pub async fn execute(command: CommonAlertCommands, session: &Session) -> Result<CommandResult> {
    match command {
        CommonAlertCommands::List(opts) => list(&COMMON_ALERTS, session, &opts).await,
        CommonAlertCommands::Show(opts) => show(&COMMON_ALERTS, session, &opts.id).await,
        CommonAlertCommands::Create(opts) => {
            let input = opts.to_input()?;
            create(&COMMON_ALERTS, session, &input).await
        }
        CommonAlertCommands::Update(opts) => {
            update(&COMMON_ALERTS, session, &opts.id, &opts.to_input()).await
        }
        CommonAlertCommands::Delete(opts) => Ok(delete(&COMMON_ALERTS, session, &opts.ids).await),
        CommonAlertCommands::Enable(opts) => {
            Ok(perform(&COMMON_ALERTS, session, &opts.ids, "enable").await)
        }
        CommonAlertCommands::Disable(opts) => {
            Ok(perform(&COMMON_ALERTS, session, &opts.ids, "disable").await)
        }
    }
}
