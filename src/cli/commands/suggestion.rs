//! `suggestsysrule-*` and `suggestsysalert-*` commands.

use anyhow::Result;

use super::{create, delete, list, perform, show, update};
use crate::cli::output::CommandResult;
use crate::cli::types::SuggestionCommands;
use crate::mcclient::modules::monitor::{SUGGEST_SYS_ALERTS, SUGGEST_SYS_RULES};
use crate::mcclient::Session;

pub async fn execute(command: SuggestionCommands, session: &Session) -> Result<CommandResult> {
    match command {
        SuggestionCommands::RuleList(opts) => list(&SUGGEST_SYS_RULES, session, &opts).await,
        SuggestionCommands::RuleShow(opts) => show(&SUGGEST_SYS_RULES, session, &opts.id).await,
        SuggestionCommands::RuleCreate(opts) => {
            let input = opts.to_input()?;
            create(&SUGGEST_SYS_RULES, session, &input).await
        }
        SuggestionCommands::RuleUpdate(opts) => {
            let input = opts.to_input()?;
            update(&SUGGEST_SYS_RULES, session, &opts.id, &input).await
        }
        SuggestionCommands::RuleDelete(opts) => Ok(delete(&SUGGEST_SYS_RULES, session, &opts.ids).await),
        SuggestionCommands::RuleEnable(opts) => {
            Ok(perform(&SUGGEST_SYS_RULES, session, &opts.ids, "enable").await)
        }
        SuggestionCommands::RuleDisable(opts) => {
            Ok(perform(&SUGGEST_SYS_RULES, session, &opts.ids, "disable").await)
        }
        SuggestionCommands::AlertList(opts) => list(&SUGGEST_SYS_ALERTS, session, &opts).await,
        SuggestionCommands::AlertShow(opts) => show(&SUGGEST_SYS_ALERTS, session, &opts.id).await,
        SuggestionCommands::AlertDelete(opts) => Ok(delete(&SUGGEST_SYS_ALERTS, session, &opts.ids).await),
    }
}
