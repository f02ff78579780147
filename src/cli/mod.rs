//! climc: command line client of the monitor service.

pub mod commands;
pub mod output;
pub mod types;

use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::mcclient::Session;
pub use output::{print_batch_results, print_list, print_object, CommandResult};
pub use types::{Cli, Commands};

/// Run one parsed command and print its result.
///
/// Batch commands print every outcome first and fail if any element failed.
pub async fn run(cli: Cli) -> Result<()> {
    let session = Session::new(&cli.endpoint, cli.token.clone(), Duration::from_secs(cli.timeout))
        .context("Failed to build monitor session")?;
    let result = commands::execute(cli.command, &session).await?;

    match &result {
        CommandResult::Object(value) => print_object(value, cli.json),
        CommandResult::List(list) => print_list(list, cli.json),
        CommandResult::Batch(results) => print_batch_results(results, cli.json),
    }

    let failed = result.failures();
    if failed > 0 {
        bail!("{failed} operation(s) failed");
    }
    Ok(())
}

/// Print an error the way the output mode expects and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
