//! Reconciles the instant models an LLM actually serves with the
//! `llm_instant_models_tbl` rows, and the mount/unmount steps of a sync.
//!
//! A model is *probed* when the model server lists it and *mounted* when
//! one of its image directories is overlaid into the container.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::compute::{container_status, ContainerPostOverlayInput, PostOverlay};
use crate::domain::models::{
    InstantModel, InternalInstantModelInfo, Llm, LlmInstantModel, LlmStatus, LlmSyncModelTaskInput,
    ModelInfo, QuickModelMethod, Resource, ResourceBase,
};
use crate::domain::ports::ResourceFilter;
use crate::drivers::LlmContainerDriver;
use crate::services::context::AppContext;
use crate::services::llm_runtime::{llm_container, llm_driver, llm_url, owner_volume};
use crate::services::wait::{poll_until, PollStep};

pub const ACTION_ADD_POST_OVERLAY: &str = "add-volume-mount-post-overlay";
pub const ACTION_REMOVE_POST_OVERLAY: &str = "remove-volume-mount-post-overlay";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelState {
    pub info: InternalInstantModelInfo,
    pub probed: bool,
    pub mounted: bool,
}

/// Probed models from the server merged with the models whose overlays are
/// present on the container.
pub async fn probed_mounted_models(app: &AppContext, llm: &Llm) -> DomainResult<HashMap<String, ModelState>> {
    let driver = llm_driver(app, llm)?;
    let url = llm_url(app, llm).await?;
    let probed = driver
        .probed_instant_models(&url, &[])
        .await
        .map_err(|e| e.context("probe instant models"))?;

    let name_to_id: HashMap<String, String> = probed
        .values()
        .map(|m| (format!("{}:{}", m.name, m.tag), m.model_id.clone()))
        .collect();

    let mut states: HashMap<String, ModelState> = probed
        .into_iter()
        .map(|(id, info)| {
            (
                id,
                ModelState {
                    info,
                    probed: true,
                    mounted: false,
                },
            )
        })
        .collect();

    for overlay in container_overlays(app, llm).await? {
        let Some(model_id) = driver.instant_model_id_by_post_overlay(&overlay, &name_to_id) else {
            continue;
        };
        states
            .entry(model_id.clone())
            .or_insert_with(|| ModelState {
                info: InternalInstantModelInfo {
                    model_id,
                    ..Default::default()
                },
                ..Default::default()
            })
            .mounted = true;
    }
    Ok(states)
}

async fn container_overlays(app: &AppContext, llm: &Llm) -> DomainResult<Vec<PostOverlay>> {
    let record = llm_container(app, llm).await?;
    let container = app
        .compute
        .get_container(&record.cmp_id)
        .await?
        .ok_or_else(|| DomainError::not_found("container", &record.cmp_id))?;
    let spec = container
        .spec
        .as_ref()
        .ok_or_else(|| DomainError::InvalidStatus(format!("container {} has no spec", container.id)))?;
    let disk = spec
        .volume_mounts
        .first()
        .and_then(|m| m.disk.as_ref())
        .ok_or_else(|| DomainError::InvalidStatus(format!("container {} has no disk mount", container.id)))?;
    Ok(disk.post_overlay.clone())
}

pub async fn fetch_models(
    app: &AppContext,
    llm_id: &str,
    probed: Option<bool>,
    mounted: Option<bool>,
    system: Option<bool>,
) -> DomainResult<Vec<LlmInstantModel>> {
    let mut filter = ResourceFilter::new().eq("llm_id", llm_id);
    if let Some(probed) = probed {
        filter = filter.eq("is_probed", probed);
    }
    if let Some(mounted) = mounted {
        filter = filter.eq("is_mounted", mounted);
    }
    if let Some(system) = system {
        filter = filter.eq("is_system", system);
    }
    app.repos.llm_instant_models.list(&filter).await
}

pub async fn mounted_model_full_names(app: &AppContext, llm_id: &str) -> DomainResult<Vec<String>> {
    Ok(fetch_models(app, llm_id, None, Some(true), None)
        .await?
        .iter()
        .map(LlmInstantModel::full_name)
        .collect())
}

/// Create or update the per-LLM row of a model. Empty names and `None`
/// flags leave the stored value alone.
pub async fn upsert_llm_instant_model(
    app: &AppContext,
    llm_id: &str,
    model_id: &str,
    name: &str,
    tag: &str,
    probed: Option<bool>,
    mounted: Option<bool>,
) -> DomainResult<LlmInstantModel> {
    let existing = app
        .repos
        .llm_instant_models
        .list(&ResourceFilter::new().eq("llm_id", llm_id).eq("model_id", model_id))
        .await?
        .into_iter()
        .next();

    match existing {
        Some(mut model) => {
            if !name.is_empty() {
                model.model_name = name.to_string();
            }
            if !tag.is_empty() {
                model.tag = tag.to_string();
            }
            if let Some(probed) = probed {
                model.is_probed = probed;
            }
            if let Some(mounted) = mounted {
                model.is_mounted = mounted;
            }
            model.base_mut().touch();
            app.repos.llm_instant_models.update(&model).await?;
            Ok(model)
        }
        None => {
            let model = LlmInstantModel {
                base: ResourceBase::new(format!("{llm_id}-{model_id}"), "ready"),
                llm_id: llm_id.to_string(),
                model_id: model_id.to_string(),
                model_name: name.to_string(),
                tag: tag.to_string(),
                is_probed: probed.unwrap_or(false),
                is_mounted: mounted.unwrap_or(false),
                is_system: false,
            };
            app.repos.llm_instant_models.insert(&model).await?;
            Ok(model)
        }
    }
}

/// Re-probe the model server and store what it reports. Skipped when the
/// last probe is younger than the probe interval, unless `force` is set.
pub async fn refresh_instant_models(app: &AppContext, llm: &Llm, force: bool) -> DomainResult<()> {
    if !force {
        if let Some(last) = llm.last_instant_model_probe {
            if Utc::now() - last < app.probe_interval() {
                debug!(llm_id = %llm.base.id, "instant models probed recently");
                return Ok(());
            }
        }
    }

    let mut states = probed_mounted_models(app, llm).await?;
    for model in fetch_models(app, &llm.base.id, None, None, None).await? {
        if let Some(state) = states.remove(&model.model_id) {
            upsert_llm_instant_model(
                app,
                &llm.base.id,
                &model.model_id,
                &state.info.name,
                &state.info.tag,
                Some(state.probed),
                Some(state.mounted),
            )
            .await?;
        } else {
            upsert_llm_instant_model(app, &llm.base.id, &model.model_id, "", "", Some(false), Some(false))
                .await?;
        }
    }
    for (model_id, state) in states {
        upsert_llm_instant_model(
            app,
            &llm.base.id,
            &model_id,
            &state.info.name,
            &state.info.tag,
            Some(state.probed),
            Some(state.mounted),
        )
        .await?;
    }

    let mut fresh = app.repos.llms.fetch(&llm.base.id).await?;
    fresh.last_instant_model_probe = Some(Utc::now());
    app.repos.llms.update(&fresh).await?;
    Ok(())
}

fn find_model<'a>(all: &'a [LlmInstantModel], info: &ModelInfo) -> Option<&'a LlmInstantModel> {
    all.iter().find(|m| m.model_id == info.model_id)
}

/// Mounted models the sync has to take off the container: everything named
/// for uninstall or reinstall, and installs of models that are mounted but
/// not served.
pub fn find_models_to_unmount(all: &[LlmInstantModel], input: &LlmSyncModelTaskInput) -> Vec<LlmInstantModel> {
    input
        .models
        .iter()
        .filter_map(|info| find_model(all, info))
        .filter(|m| {
            m.is_mounted
                && match input.method {
                    QuickModelMethod::Uninstall | QuickModelMethod::Reinstall => true,
                    QuickModelMethod::Install => !m.is_probed,
                }
        })
        .cloned()
        .collect()
}

/// Enabled instant model backing a per-LLM model row.
pub async fn instant_model_for(app: &AppContext, model_id: &str, tag: &str) -> DomainResult<Option<InstantModel>> {
    let mut filter = ResourceFilter::new().eq("model_id", model_id).newest_first();
    if !tag.is_empty() {
        filter = filter.eq("model_tag", tag);
    }
    let candidates = app.repos.instant_models.list(&filter).await?;
    Ok(candidates
        .iter()
        .find(|m| m.enabled)
        .or_else(|| candidates.first())
        .cloned())
}

/// Overlays exposing every mount directory of the given models.
pub async fn models_to_overlays(
    app: &AppContext,
    driver: &dyn LlmContainerDriver,
    models: &[LlmInstantModel],
) -> DomainResult<Vec<PostOverlay>> {
    let mut errors = Vec::new();
    let mut dirs = Vec::new();
    for model in models {
        match instant_model_for(app, &model.model_id, &model.tag).await? {
            Some(instant) if !instant.image_id.is_empty() => dirs.extend(driver.mount_dirs(&instant)),
            _ => errors.push(format!("no instant model image for {}", model.full_name())),
        }
    }
    if dirs.is_empty() {
        if errors.is_empty() {
            return Ok(Vec::new());
        }
        return Err(DomainError::not_found("instant_model", errors.join("; ")));
    }
    if !errors.is_empty() {
        error!(errors = %errors.join("; "), "some models have no mount directories");
    }
    Ok(dirs.iter().map(|d| driver.dir_post_overlay(d)).collect())
}

/// Uninstall (when running) and collect the overlays to remove.
pub async fn request_unmount(
    app: &AppContext,
    llm: &Llm,
    input: &LlmSyncModelTaskInput,
) -> DomainResult<(Vec<String>, Vec<PostOverlay>)> {
    let running = input.llm_status == LlmStatus::Running.as_str();
    if running {
        refresh_instant_models(app, llm, true).await?;
    }
    let all = fetch_models(app, &llm.base.id, None, None, None).await?;
    let unmount = find_models_to_unmount(&all, input);

    if running {
        let driver = llm_driver(app, llm)?;
        let url = llm_url(app, llm).await?;
        for model in &unmount {
            if let Err(err) = driver.uninstall_model(&url, model).await {
                error!(model = %model.full_name(), error = %err, "uninstall failed");
            }
        }
    }
    if unmount.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let unmount_ids: Vec<String> = unmount.iter().map(|m| m.model_id.clone()).collect();
    let mut overlays = Vec::new();
    for overlay in container_overlays(app, llm).await? {
        let Some(image_id) = overlay.image.as_ref().map(|i| i.id.clone()).filter(|id| !id.is_empty()) else {
            continue;
        };
        let owner = app
            .repos
            .instant_models
            .list(&ResourceFilter::new().eq("image_id", image_id.as_str()))
            .await?
            .into_iter()
            .next();
        if owner.is_some_and(|m| unmount_ids.contains(&m.model_id)) {
            overlays.push(overlay);
        }
    }
    Ok((unmount_ids, overlays))
}

/// Register the models to mount and build their overlays. Returns the model
/// ids, the container target directories and the overlays.
pub async fn request_mount(
    app: &AppContext,
    llm: &Llm,
    input: &LlmSyncModelTaskInput,
) -> DomainResult<(Vec<String>, Vec<String>, Vec<PostOverlay>)> {
    let running = input.llm_status == LlmStatus::Running.as_str();
    if running {
        refresh_instant_models(app, llm, true).await?;
    }
    if input.method == QuickModelMethod::Uninstall {
        return Ok((Vec::new(), Vec::new(), Vec::new()));
    }
    let existing = fetch_models(app, &llm.base.id, None, None, None).await?;

    let mut models = Vec::new();
    for info in &input.models {
        if input.method == QuickModelMethod::Install {
            if let Some(current) = find_model(&existing, info) {
                if current.is_probed || current.is_mounted {
                    debug!(model_id = %info.model_id, "already installed");
                    continue;
                }
            }
        }
        let model =
            upsert_llm_instant_model(app, &llm.base.id, &info.model_id, &info.display_name, &info.tag, None, None)
                .await?;
        models.push(model);
    }
    if models.is_empty() {
        return Ok((Vec::new(), Vec::new(), Vec::new()));
    }

    let driver = llm_driver(app, llm)?;
    let overlays = models_to_overlays(app, driver.as_ref(), &models).await?;
    if running {
        let url = llm_url(app, llm).await?;
        for model in &models {
            if let Err(err) = driver.pre_install_model(&url, model).await {
                error!(model = %model.full_name(), error = %err, "pre-install failed");
            }
        }
    }
    let ids = models.iter().map(|m| m.model_id.clone()).collect();
    let dirs = overlays
        .iter()
        .filter(|o| !o.container_target_dir.is_empty())
        .map(|o| o.container_target_dir.clone())
        .collect();
    Ok((ids, dirs, overlays))
}

async fn container_post_overlay(
    app: &AppContext,
    llm: &Llm,
    input: &ContainerPostOverlayInput,
    add: bool,
) -> DomainResult<()> {
    let record = llm_container(app, llm).await?;
    let container = app
        .compute
        .get_container(&record.cmp_id)
        .await?
        .ok_or_else(|| DomainError::not_found("container", &record.cmp_id))?;
    if !container_status::is_final(&container.status) {
        return Err(DomainError::InvalidStatus(format!(
            "cannot change post overlays of container {} in status {}",
            container.id, container.status
        )));
    }
    if add {
        app.compute.container_add_post_overlay(&container.id, input).await
    } else {
        app.compute.container_remove_post_overlay(&container.id, input).await
    }
}

/// Apply overlays, retrying while the container reports an invalid status.
pub async fn try_container_post_overlay(
    app: &AppContext,
    llm: &Llm,
    overlays: Vec<PostOverlay>,
    add: bool,
) -> DomainResult<()> {
    let input = if add {
        ContainerPostOverlayInput {
            index: 0,
            post_overlay: overlays,
            use_lazy: false,
            clear_layers: false,
        }
    } else {
        ContainerPostOverlayInput {
            index: 0,
            post_overlay: overlays,
            use_lazy: true,
            clear_layers: true,
        }
    };
    let action = if add {
        ACTION_ADD_POST_OVERLAY
    } else {
        ACTION_REMOVE_POST_OVERLAY
    };
    let what = format!("{action} on llm {}", llm.base.id);
    let input = &input;
    poll_until(app.mount_poll(), &what, || async move {
        match container_post_overlay(app, llm, &input, add).await {
            Ok(()) => Ok(PollStep::Done(())),
            Err(err) if err.is_invalid_status() => {
                warn!(llm_id = %llm.base.id, action, error = %err, "container busy, retrying");
                Ok(PollStep::Pending(err.to_string()))
            }
            Err(err) => Err(err.context(action)),
        }
    })
    .await
}

/// Flip the mount state of models and record the mounted set on the volume.
pub async fn mark_models_mounted(
    app: &AppContext,
    llm: &Llm,
    llm_status: &str,
    model_ids: &[String],
    mounted: bool,
) -> DomainResult<()> {
    for model_id in model_ids {
        upsert_llm_instant_model(app, &llm.base.id, model_id, "", "", Some(mounted), Some(mounted)).await?;
    }
    if llm_status == LlmStatus::Running.as_str() {
        refresh_instant_models(app, llm, true).await?;
    }
    let full_names = mounted_model_full_names(app, &llm.base.id).await?;
    let mut volume = owner_volume(app, &llm.base.id).await?;
    volume.mounted_models = full_names;
    volume.base_mut().touch();
    app.repos.volumes.update(&volume).await?;
    info!(llm_id = %llm.base.id, mounted = ?volume.mounted_models, "mounted models updated");
    Ok(())
}

pub async fn install_models(app: &AppContext, llm: &Llm, dirs: &[String], model_ids: &[String]) -> DomainResult<()> {
    let driver = llm_driver(app, llm)?;
    let url = llm_url(app, llm).await?;
    driver.install_model(&url, dirs, model_ids).await
}

/// Every given model must now be served.
pub async fn ensure_models_installed(app: &AppContext, llm: &Llm, model_ids: &[String]) -> DomainResult<()> {
    let driver = llm_driver(app, llm)?;
    let url = llm_url(app, llm).await?;
    let probed = driver.probed_instant_models(&url, model_ids).await?;
    let missing: Vec<&str> = model_ids
        .iter()
        .filter(|id| !probed.contains_key(*id))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DomainError::not_found("instant_model", missing.join(",")))
    }
}

/// Size of the models an LLM already holds.
pub async fn installed_size_gb(app: &AppContext, llm_id: &str) -> DomainResult<f64> {
    let mut total = 0.0;
    for model in fetch_models(app, llm_id, None, None, None).await? {
        if !(model.is_probed || model.is_mounted) {
            continue;
        }
        if let Some(instant) = instant_model_for(app, &model.model_id, &model.tag).await? {
            total += instant.actual_size_gb();
        }
    }
    Ok(total)
}
