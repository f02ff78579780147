//! Polling helpers for remote resources that settle asynchronously.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{image_status, ContainerDetails, ImageDetails, ServerDetails};
use crate::domain::ports::{ComputeClient, ImageClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        Self::new(Duration::from_secs(interval_secs), Duration::from_secs(timeout_secs))
    }
}

/// Result of one poll.
pub enum PollStep<T> {
    Done(T),
    Pending(String),
}

/// Call `check` every `config.interval` until it reports `Done`, it fails,
/// or the deadline passes.
pub async fn poll_until<T, F, Fut>(config: PollConfig, what: &str, mut check: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<PollStep<T>>>,
{
    let deadline = Instant::now() + config.timeout;
    loop {
        match check().await? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Pending(status) => {
                if Instant::now() >= deadline {
                    return Err(DomainError::Timeout(format!(
                        "{what} still {status} after {}s",
                        config.timeout.as_secs()
                    )));
                }
                debug!(what, status = %status, "waiting");
            }
        }
        tokio::time::sleep(config.interval).await;
    }
}

fn is_failed_status(status: &str) -> bool {
    status.contains("fail")
}

pub async fn wait_server_status(
    compute: &dyn ComputeClient,
    server_id: &str,
    targets: &[&str],
    config: PollConfig,
) -> DomainResult<ServerDetails> {
    let what = format!("server {server_id}");
    poll_until(config, &what, || async move {
        let server = compute
            .get_server(server_id)
            .await?
            .ok_or_else(|| DomainError::not_found("server", server_id))?;
        if targets.contains(&server.status.as_str()) {
            return Ok(PollStep::Done(server));
        }
        if is_failed_status(&server.status) {
            return Err(DomainError::InvalidStatus(format!(
                "server {server_id} status {}",
                server.status
            )));
        }
        Ok(PollStep::Pending(server.status))
    })
    .await
}

pub async fn wait_server_deleted(
    compute: &dyn ComputeClient,
    server_id: &str,
    config: PollConfig,
) -> DomainResult<()> {
    let what = format!("server {server_id}");
    poll_until(config, &what, || async move {
        match compute.get_server(server_id).await? {
            None => Ok(PollStep::Done(())),
            Some(server) if is_failed_status(&server.status) => Err(DomainError::InvalidStatus(
                format!("server {server_id} status {}", server.status),
            )),
            Some(server) => Ok(PollStep::Pending(server.status)),
        }
    })
    .await
}

pub async fn wait_container_status(
    compute: &dyn ComputeClient,
    container_id: &str,
    targets: &[&str],
    config: PollConfig,
) -> DomainResult<ContainerDetails> {
    let what = format!("container {container_id}");
    poll_until(config, &what, || async move {
        let container = compute
            .get_container(container_id)
            .await?
            .ok_or_else(|| DomainError::not_found("container", container_id))?;
        if targets.contains(&container.status.as_str()) {
            return Ok(PollStep::Done(container));
        }
        if is_failed_status(&container.status) {
            return Err(DomainError::InvalidStatus(format!(
                "container {container_id} status {}",
                container.status
            )));
        }
        Ok(PollStep::Pending(container.status))
    })
    .await
}

pub async fn wait_image_status(
    images: &dyn ImageClient,
    image_id: &str,
    targets: &[&str],
    config: PollConfig,
) -> DomainResult<ImageDetails> {
    let what = format!("image {image_id}");
    poll_until(config, &what, || async move {
        let image = images
            .get_image(image_id)
            .await?
            .ok_or_else(|| DomainError::not_found("image", image_id))?;
        if targets.contains(&image.status.as_str()) {
            return Ok(PollStep::Done(image));
        }
        if is_failed_status(&image.status)
            || image.status == image_status::KILLED
            || image.status == image_status::DEACTIVATED
        {
            return Err(DomainError::InvalidStatus(format!(
                "image {image_id} status {}",
                image.status
            )));
        }
        Ok(PollStep::Pending(image.status))
    })
    .await
}
