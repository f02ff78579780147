//! `unifiedmonitor-query`.

use anyhow::{Context, Result};

use crate::cli::output::CommandResult;
use crate::cli::types::UnifiedMonitorCommands;
use crate::mcclient::modules::monitor::unified_query;
use crate::mcclient::Session;

pub async fn execute(command: UnifiedMonitorCommands, session: &Session) -> Result<CommandResult> {
    match command {
        UnifiedMonitorCommands::Query(opts) => {
            let input = opts.to_input()?;
            let body = serde_json::to_value(&input)?;
            let result = unified_query(session, &body)
                .await
                .with_context(|| format!("Failed to query {}", opts.measurement))?;
            Ok(CommandResult::Object(result))
        }
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

    fn parse(args: &[&str]) -> UnifiedMonitorCommands {
        match Cli::parse_from(args).command {
            Commands::UnifiedMonitor(cmd) => cmd,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_posts_reducer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/unifiedmonitors/query")
            .match_body(Matcher::PartialJson(json!({
                "unifiedmonitors": {"from": "1h", "reducer": {"type": "percentile", "params": [95.0]}}
            })))
            .with_status(200)
            .with_body(r#"{"series": [{"name": "cpu", "points": [[12.5, 1700000000000]]}]}"#)
            .create_async()
            .await;

        let cmd = parse(&[
            "climc",
            "unifiedmonitor-query",
            "cpu",
            "--field",
            "usage_active",
            "--reducer",
            "percentile(95)",
        ]);
        let CommandResult::Object(body) = execute(cmd, &test_session(&server)).await.unwrap() else {
            panic!("expected an object");
        };
        assert_eq!(body["series"][0]["name"], "cpu");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_reducer_is_rejected_locally() {
        let server = mockito::Server::new_async().await;
        let cmd = parse(&["climc", "unifiedmonitor-query", "cpu", "--field", "f", "--reducer", "p(x)"]);
        let err = execute(cmd, &test_session(&server)).await.unwrap_err();
        assert!(err.to_string().contains("invalid reducer"));
    }
}
