//! Import of an instant model from the model registry.
//!
//! The package is downloaded into the working directory, packed as a `tgz`
//! image and uploaded to the image service. The model is usable once the
//! image turns active. Params are a serialized [`InstantModelImportInput`];
//! the download stage adds `model_id` and `mounts`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tracing::{info, warn};

use super::{current_stage, next, TaskStage};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{image_status, ImageUploadInput};
use crate::domain::models::{InstantModelImportInput, Resource, TaskRecord, INIT_STAGE};
use crate::services::catalog_service::{
    sync_image_status, INSTANT_MODEL_STATUS_IMPORTING, INSTANT_MODEL_STATUS_IMPORT_FAILED,
};
use crate::services::context::AppContext;
use crate::services::task_manager::{StageOutcome, TaskContext, TaskHandler};
use crate::services::wait::wait_image_status;

const ARCHIVE_NAME: &str = "model.tgz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Init,
    Download,
    Upload,
    WaitImage,
}

impl TaskStage for ImportStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Init => INIT_STAGE,
            Self::Download => "on_download",
            Self::Upload => "on_upload",
            Self::WaitImage => "on_wait_image",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            INIT_STAGE => Some(Self::Init),
            "on_download" => Some(Self::Download),
            "on_upload" => Some(Self::Upload),
            "on_wait_image" => Some(Self::WaitImage),
            _ => None,
        }
    }
}

/// Scratch directory of one import; the package goes under `model/`.
fn work_dir(app: &AppContext, task: &TaskRecord) -> PathBuf {
    app.config.working_dir.join(format!("import-{}", task.id))
}

/// Pack the contents of `src` into a gzip tarball at `dst`.
async fn pack_tgz(src: &Path, dst: &Path) -> DomainResult<()> {
    let output = Command::new("tar")
        .arg("-czf")
        .arg(dst)
        .arg("-C")
        .arg(src)
        .arg(".")
        .output()
        .await
        .map_err(|e| DomainError::Io(format!("run tar: {e}")))?;
    if !output.status.success() {
        return Err(DomainError::Io(format!(
            "pack {}: {}",
            dst.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

async fn remove_work_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(dir = %dir.display(), error = %err, "remove import directory"),
    }
}

pub struct InstantModelImportTask;

impl InstantModelImportTask {
    fn input(task: &TaskRecord) -> DomainResult<InstantModelImportInput> {
        Ok(serde_json::from_value(task.params.clone())?)
    }

    async fn download(app: &AppContext, task: &mut TaskRecord) -> DomainResult<()> {
        let input = Self::input(task)?;
        let model = app.repos.instant_models.fetch(&task.obj_id).await?;
        let driver = app.drivers.get_or_err(model.llm_type)?;

        let dir = work_dir(app, task);
        // A resumed task starts over from an empty directory.
        remove_work_dir(&dir).await;
        let package = dir.join("model");
        tokio::fs::create_dir_all(&package).await?;

        let downloaded = driver
            .download_model(&package, &input.model_name, &input.model_tag)
            .await?;
        pack_tgz(&package, &dir.join(ARCHIVE_NAME)).await?;
        info!(model_id = %downloaded.model_id, name = %input.model_name, tag = %input.model_tag, "model packed");

        task.set_param("model_id", &downloaded.model_id);
        task.set_param("mounts", &downloaded.mounts);
        Ok(())
    }

    async fn upload(app: &AppContext, task: &mut TaskRecord) -> DomainResult<()> {
        let input = Self::input(task)?;
        let model_id: String = task
            .param("model_id")
            .ok_or_else(|| DomainError::Validation("import task without model_id".into()))?;
        let mounts: Vec<String> = task.param("mounts").unwrap_or_default();
        let mut model = app.repos.instant_models.fetch(&task.obj_id).await?;

        let mut properties = BTreeMap::new();
        properties.insert("llm_type".to_string(), model.llm_type.as_str().to_string());
        properties.insert("model_name".to_string(), input.model_name.clone());
        properties.insert("model_tag".to_string(), input.model_tag.clone());
        properties.insert("model_id".to_string(), model_id.clone());
        let upload = ImageUploadInput {
            generate_name: format!("{}-{}", input.model_name, input.model_tag),
            disk_format: image_status::DISK_FORMAT_TGZ.to_string(),
            project_id: model.base.project_id.clone(),
            properties,
        };
        let dir = work_dir(app, task);
        let image = app.images.upload_image(&upload, &dir.join(ARCHIVE_NAME)).await?;

        model.model_id = model_id;
        model.image_id = image.id.clone();
        model.mounts = mounts;
        model.size = image.size;
        model.set_status(image_status::SAVING);
        app.repos.instant_models.update(&model).await?;
        remove_work_dir(&dir).await;
        info!(model_id = %model.base.id, image_id = %image.id, "model image uploaded");
        Ok(())
    }

    async fn wait_image(app: &AppContext, task: &TaskRecord) -> DomainResult<StageOutcome> {
        let mut model = app.repos.instant_models.fetch(&task.obj_id).await?;
        if let Err(err) = wait_image_status(
            app.images.as_ref(),
            &model.image_id,
            &[image_status::ACTIVE],
            app.import_poll(),
        )
        .await
        {
            warn!(image_id = %model.image_id, error = %err, "image did not become active");
        }
        sync_image_status(app, &mut model).await?;
        let status = model.base.status.as_str();
        if matches!(
            status,
            image_status::KILLED | image_status::DEACTIVATED | image_status::DELETED
        ) {
            return Ok(StageOutcome::Failed(format!("image {} is {status}", model.image_id)));
        }
        info!(model_id = %model.base.id, name = %model.full_name(), "instant model imported");
        Ok(StageOutcome::Complete(Some(json!({
            "model_id": model.model_id,
            "image_id": model.image_id,
        }))))
    }
}

#[async_trait]
impl TaskHandler for InstantModelImportTask {
    fn name(&self) -> &'static str {
        "InstantModelImportTask"
    }

    async fn on_stage(&self, ctx: &TaskContext, task: &mut TaskRecord) -> DomainResult<StageOutcome> {
        let app = &ctx.app;
        match current_stage::<ImportStage>(task)? {
            ImportStage::Init => {
                let mut model = app.repos.instant_models.fetch(&task.obj_id).await?;
                model.set_status(INSTANT_MODEL_STATUS_IMPORTING);
                app.repos.instant_models.update(&model).await?;
                next(ImportStage::Download)
            }
            ImportStage::Download => {
                Self::download(app, task).await?;
                next(ImportStage::Upload)
            }
            ImportStage::Upload => {
                Self::upload(app, task).await?;
                next(ImportStage::WaitImage)
            }
            ImportStage::WaitImage => Self::wait_image(app, task).await,
        }
    }

    async fn on_failure(&self, ctx: &TaskContext, task: &TaskRecord, _reason: &str) -> DomainResult<()> {
        let app = &ctx.app;
        remove_work_dir(&work_dir(app, task)).await;
        if let Some(mut model) = app.repos.instant_models.get(&task.obj_id).await? {
            if model.image_id.is_empty() {
                model.set_status(INSTANT_MODEL_STATUS_IMPORT_FAILED);
                app.repos.instant_models.update(&model).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskStatus;
    use crate::services::catalog_service::CatalogService;
    use crate::services::tasks::all_handlers;
    use crate::services::TaskManager;
    use crate::test_support::{test_env, TestEnv};
    use std::time::Duration;

    async fn catalog() -> (TestEnv, CatalogService, TaskManager) {
        let env = test_env().await;
        let tasks = TaskManager::new(env.app.clone(), all_handlers());
        (env, CatalogService::new(tasks.clone()), tasks)
    }

    fn import_input(name: &str, tag: &str) -> InstantModelImportInput {
        InstantModelImportInput {
            llm_type: "ollama".into(),
            model_name: name.into(),
            model_tag: tag.into(),
            project_id: "proj-1".into(),
        }
    }

    #[test]
    fn test_stage_names() {
        for stage in [ImportStage::Init, ImportStage::Download, ImportStage::Upload, ImportStage::WaitImage] {
            assert_eq!(ImportStage::parse(stage.as_str()), Some(stage));
        }
    }

    #[tokio::test]
    async fn test_import_uploads_package_image() {
        let (env, catalog, tasks) = catalog().await;
        let manifest_digest = env.registry.publish(
            "qwen2",
            "0.5b",
            br#"{"model_format":"gguf"}"#,
            &[b"weights".as_slice(), b"license".as_slice()],
        );

        let (model, task) = catalog.import_instant_model(import_input("qwen2", "0.5b")).await.unwrap();
        assert!(model.base.name.starts_with("tmp-instant-model-"));
        assert_eq!(model.base.status, INSTANT_MODEL_STATUS_IMPORTING);
        assert_eq!(task.obj_id, model.base.id);

        let task = tasks.wait_task(&task.id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Complete, "{:?}", task.reason);

        let model = catalog.get_instant_model(&model.base.id).await.unwrap();
        assert_eq!(model.base.status, image_status::ACTIVE);
        assert_eq!(model.model_id, crate::drivers::ollama::model_id_from_digest(&manifest_digest));
        assert_eq!(model.mounts.len(), 4);
        assert_eq!(model.mounts[0], "manifests/registry.ollama.ai/library/qwen2/0.5b");
        assert!(!model.image_id.is_empty());

        let images = env.images.state();
        let upload = &images.uploads[0];
        assert_eq!(upload.generate_name, "qwen2-0.5b");
        assert_eq!(upload.disk_format, "tgz");
        assert_eq!(upload.project_id, "proj-1");
        assert_eq!(upload.properties["model_id"], model.model_id);
        let image = &images.images[&model.image_id];
        assert!(image.size > 0);
        assert!(image.properties.contains_key("internal_path_map"));
        drop(images);

        assert!(!work_dir(&env.app, &task).exists());
    }

    #[tokio::test]
    async fn test_import_of_unknown_model_fails() {
        let (env, catalog, tasks) = catalog().await;
        let (model, task) = catalog.import_instant_model(import_input("nope", "1b")).await.unwrap();

        let task = tasks.wait_task(&task.id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.reason.clone().unwrap_or_default().contains("nope:1b"));

        let model = catalog.get_instant_model(&model.base.id).await.unwrap();
        assert_eq!(model.base.status, INSTANT_MODEL_STATUS_IMPORT_FAILED);
        assert!(env.images.state().uploads.is_empty());
        assert!(!work_dir(&env.app, &task).exists());
    }

    #[tokio::test]
    async fn test_killed_image_fails_import() {
        let (env, catalog, tasks) = catalog().await;
        env.registry.publish("llama3", "8b", b"{}", &[b"weights".as_slice()]);
        env.images.state().upload_status = Some(image_status::KILLED.to_string());

        let (model, task) = catalog.import_instant_model(import_input("llama3", "8b")).await.unwrap();
        let task = tasks.wait_task(&task.id, Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);

        let model = catalog.get_instant_model(&model.base.id).await.unwrap();
        assert_eq!(model.base.status, image_status::KILLED);
        assert!(!model.image_id.is_empty());
    }

    #[tokio::test]
    async fn test_import_validates_input() {
        let (_env, catalog, _tasks) = catalog().await;
        let mut input = import_input("qwen2", "7b");
        input.model_tag = String::new();
        let err = catalog.import_instant_model(input).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut input = import_input("qwen2", "7b");
        input.llm_type = "vllm".into();
        assert!(catalog.import_instant_model(input).await.is_err());
    }
}
