//! Image service adapter over the REST client.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Body;
use serde_json::{json, Value};
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{ImageDetails, ImageUploadInput};
use crate::domain::ports::ImageClient;
use crate::mcclient::modules::image::IMAGES;
use crate::mcclient::Session;

const IMAGE_META_PREFIX: &str = "x-image-meta-";
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Upload metadata as image service headers; properties get their own prefix.
fn upload_headers(input: &ImageUploadInput, size: u64) -> Vec<(String, String)> {
    let mut headers = vec![
        (format!("{IMAGE_META_PREFIX}generate_name"), input.generate_name.clone()),
        (format!("{IMAGE_META_PREFIX}disk_format"), input.disk_format.clone()),
        (format!("{IMAGE_META_PREFIX}size"), size.to_string()),
    ];
    if !input.project_id.is_empty() {
        headers.push((format!("{IMAGE_META_PREFIX}project_id"), input.project_id.clone()));
    }
    for (key, value) in &input.properties {
        headers.push((format!("{IMAGE_META_PREFIX}property-{key}"), value.clone()));
    }
    headers
}

pub struct RestImageClient {
    session: Session,
    upload_timeout: Duration,
}

impl RestImageClient {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }
}

#[async_trait]
impl ImageClient for RestImageClient {
    async fn get_image(&self, id: &str) -> DomainResult<Option<ImageDetails>> {
        match IMAGES.get(&self.session, id, &Value::Null).await {
            Ok(body) => Ok(Some(serde_json::from_value(body)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(DomainError::from(err).context(format!("get image {id}"))),
        }
    }

    async fn update_image_properties(
        &self,
        id: &str,
        properties: BTreeMap<String, String>,
    ) -> DomainResult<()> {
        IMAGES
            .update(&self.session, id, &json!({ "properties": properties }))
            .await
            .map_err(|e| DomainError::from(e).context(format!("update image {id} properties")))?;
        Ok(())
    }

    async fn perform_image_action(&self, id: &str, action: &str, body: Value) -> DomainResult<()> {
        IMAGES
            .perform_action(&self.session, id, action, &body)
            .await
            .map_err(|e| DomainError::from(e).context(format!("image {id} {action}")))?;
        Ok(())
    }

    async fn upload_image(&self, input: &ImageUploadInput, path: &Path) -> DomainResult<ImageDetails> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DomainError::from(e).context(format!("open {}", path.display())))?;
        let size = file.metadata().await?.len();
        info!(name = %input.generate_name, size, "uploading image");

        let path_url = format!("/{}", IMAGES.keyword_plural);
        let body = self
            .session
            .upload(&path_url, &upload_headers(input, size), Body::from(file), self.upload_timeout)
            .await
            .map_err(|e| DomainError::from(e).context(format!("upload image {}", input.generate_name)))?;
        let image = body.get(IMAGES.keyword).cloned().unwrap_or(body);
        Ok(serde_json::from_value(image)?)
    }
}
