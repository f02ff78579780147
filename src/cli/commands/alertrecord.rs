//! `alertrecord-*` commands.

use anyhow::Result;

use super::{list, show};
use crate::cli::output::CommandResult;
use crate::cli::types::AlertRecordCommands;
use crate::mcclient::modules::monitor::ALERT_RECORDS;
use crate::mcclient::Session;

pub async fn execute(command: AlertRecordCommands, session: &Session) -> Result<CommandResult> {
    match command {
        AlertRecordCommands::List(opts) => list(&ALERT_RECORDS, session, &opts).await,
        AlertRecordCommands::Show(opts) => show(&ALERT_RECORDS, session, &opts.id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use mockito::Matcher;

    use crate::cli::commands::test_session;
    use crate::cli::types::{Cli, Commands};

    #[tokio::test]
    async fn test_list_records_by_state() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/alertrecords")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "alerting".into()),
                Matcher::UrlEncoded("alert_id".into(), "a1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"alertrecords": [{"id": "r1", "state": "alerting"}], "total": 7, "limit": 1}"#)
            .create_async()
            .await;

        let Commands::AlertRecord(cmd) =
            Cli::parse_from(["climc", "alertrecord-list", "--state", "alerting", "--alert-id", "a1"]).command
        else {
            panic!("unexpected command");
        };
        let CommandResult::List(list) = execute(cmd, &test_session(&server)).await.unwrap() else {
            panic!("expected a list");
        };
        assert_eq!(list.total, 7);
        assert_eq!(list.data[0]["state"], "alerting");
        mock.assert_async().await;
    }
}
