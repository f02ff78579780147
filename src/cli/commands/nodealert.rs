//! `nodealert-*` commands.

use anyhow::Result;

use super::{create, delete, list, perform, show, update};
use crate::cli::output::CommandResult;
use crate::cli::types::NodeAlertCommands;
use crate::mcclient::modules::monitor::NODE_ALERTS;
use crate::mcclient::Session;

pub async fn execute(command: NodeAlertCommands, session: &Session) -> Result<CommandResult> {
    match command {
        NodeAlertCommands::List(opts) => list(&NODE_ALERTS, session, &opts).await,
        NodeAlertCommands::Show(opts) => show(&NODE_ALERTS, session, &opts.id).await,
        NodeAlertCommands::Create(opts) => create(&NODE_ALERTS, session, &opts.to_input()).await,
        NodeAlertCommands::Update(opts) => update(&NODE_ALERTS, session, &opts.id, &opts.to_input()).await,
        NodeAlertCommands::Delete(opts) => Ok(delete(&NODE_ALERTS, session, &opts.ids).await),
        NodeAlertCommands::Enable(opts) => Ok(perform(&NODE_ALERTS, session, &opts.ids, "enable").await),
        NodeAlertCommands::Disable(opts) => Ok(perform(&NODE_ALERTS, session, &opts.ids, "disable").await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use mockito::Matcher;
    use serde_json::json;

    use crate::cli::commands::test_session;
    use crate::cli::types::{Cli, Commands};

    fn parse(args: &[&str]) -> NodeAlertCommands {
        match Cli::parse_from(args).command {
            Commands::NodeAlert(cmd) => cmd,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_node_alert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/nodealerts")
            .match_body(Matcher::PartialJson(json!({
                "nodealert": {"name": "vm-cpu", "type": "guest", "node_id": "g1", "comparator": "gt"}
            })))
            .with_status(200)
            .with_body(r#"{"nodealert": {"id": "na1", "name": "vm-cpu"}}"#)
            .create_async()
            .await;

        let cmd = parse(&[
            "climc",
            "nodealert-create",
            "vm-cpu",
            "cpu.usage_active",
            "guest",
            "g1",
            "gt",
            "80",
            "--period",
            "5m",
        ]);
        let result = execute(cmd, &test_session(&server)).await.unwrap();
        assert_eq!(result, CommandResult::Object(json!({"id": "na1", "name": "vm-cpu"})));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_sends_only_given_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/nodealerts/na1")
            .match_body(Matcher::Json(json!({"nodealert": {"threshold": 95.0}})))
            .with_status(200)
            .with_body(r#"{"nodealert": {"id": "na1", "threshold": 95.0}}"#)
            .create_async()
            .await;

        let cmd = parse(&["climc", "nodealert-update", "na1", "--threshold", "95"]);
        execute(cmd, &test_session(&server)).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_by_node_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/nodealerts")
            .match_query(Matcher::UrlEncoded("type".into(), "host".into()))
            .with_status(200)
            .with_body(r#"{"nodealerts": [], "total": 0}"#)
            .create_async()
            .await;

        let cmd = parse(&["climc", "nodealert-list", "--node-type", "host"]);
        let result = execute(cmd, &test_session(&server)).await.unwrap();
        assert_eq!(result, CommandResult::List(crate::mcclient::ListResult::default()));
        mock.assert_async().await;
    }
}
