//! LLM service entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use onecloud_llm::adapters::sqlite::initialize_database;
use onecloud_llm::adapters::{OllamaClient, OllamaRegistryClient, RestComputeClient, RestImageClient};
use onecloud_llm::api::{self, ApiState};
use onecloud_llm::infrastructure::config::ConfigLoader;
use onecloud_llm::infrastructure::logging::LoggerImpl;
use onecloud_llm::mcclient::Session;
use onecloud_llm::services::tasks::all_handlers;
use onecloud_llm::services::{AppContext, Repositories, TaskManager};

#[derive(Parser, Debug)]
#[command(name = "llm")]
#[command(about = "OneCloud LLM container service", long_about = None)]
#[command(version)]
struct Args {
    /// Config file, defaults to /etc/yunion/llm.conf
    #[arg(long, env = "LLM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Args::parse()).await {
        error!(error = %format!("{err:#}"), "llm service failed");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ConfigLoader::load(args.config.as_deref())?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let pool = initialize_database(&config.database)
        .await
        .context("Failed to initialize database")?;

    let endpoints = &config.endpoints;
    let timeout = Duration::from_secs(endpoints.request_timeout_secs);
    let token = Some(endpoints.auth_token.clone());
    let compute = RestComputeClient::new(Session::new(&endpoints.compute_url, token.clone(), timeout)?);
    let images = RestImageClient::new(Session::new(&endpoints.image_url, token, timeout)?)
        .with_upload_timeout(Duration::from_secs(config.tasks.import_timeout_secs));
    let pull_timeout = Duration::from_secs(config.tasks.model_pull_timeout_secs);
    let llm_client = OllamaClient::new(pull_timeout)?;
    let registry = OllamaRegistryClient::new(&endpoints.model_registry_url, pull_timeout)?;

    let app = Arc::new(AppContext::new(
        Repositories::sqlite(&pool),
        Arc::new(compute),
        Arc::new(images),
        Arc::new(llm_client),
        Arc::new(registry),
        config.tasks.clone(),
    ));
    let tasks = TaskManager::new(app, all_handlers());
    let resumed = tasks.resume_unfinished().await?;
    info!(resumed, region = %config.region, "task manager ready");

    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.address, config.port))?;
    let state = Arc::new(ApiState::new(tasks));
    api::serve(state, addr, shutdown_signal()).await?;

    pool.close().await;
    info!("llm service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
