//! Session context: the glue between settings, the service and progress
//!
//! A `Session` owns everything one user's work needs (client, catalog,
//! polling options, event bus). Only one avatar computation is active at a
//! time: starting a new one cancels the polls of the previous one.

use crate::error::{AsdkError, AsdkResult};
use crate::jobs::{poll_job, AvatarJob, ExportJob, PollOptions, RemoteJob};
use crate::params::{
    export_parameters_pair, generate_computation_parameters, remove_export_duplicates,
    ConfigTree, ExportParameterSpec, ExportSection, ParameterCatalog, ParameterSpec,
};
use crate::pipeline::PipelineSelection;
use crate::retrieval::{
    avatar_file, download_with_progress, extract_archive, resolve_export, ArchiveContents,
    FULL_EXPORT_INDEX, VISUAL_EXPORT_INDEX,
};
use crate::transport::{AvatarSdkClient, NewAvatar};
use asdk_common::events::{AsdkEvent, EventBus, Stage};
use bytes::Bytes;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default settings for one pipeline selection
#[derive(Debug, Clone)]
pub struct Settings {
    pub selection: PipelineSelection,
    /// Computation parameters as listed by the service, minus export categories
    pub parameter_spec: ParameterSpec,
    pub export_spec: ExportParameterSpec,
    pub parameters: ConfigTree,
    pub export: ExportSection,
}

/// Photo to compute an avatar from
#[derive(Debug, Clone)]
pub struct Photo {
    pub name: String,
    pub data: Bytes,
}

/// Everything a finished computation produced
#[derive(Debug)]
pub struct AvatarOutcome {
    pub avatar: AvatarJob,
    /// Reduced export used for the preview
    pub preview_export: ExportJob,
    /// Unpacked preview archive
    pub preview_files: ArchiveContents,
    /// Export built from the user's settings
    ///
    /// Resolved independently of the preview: `Ok(None)` when the service
    /// created no such export, `Err` when it failed or timed out.
    pub full_export: AsdkResult<Option<ExportJob>>,
}

pub struct Session {
    client: Arc<AvatarSdkClient>,
    catalog: ParameterCatalog,
    poll: PollOptions,
    events: EventBus,
    active: Mutex<Option<CancellationToken>>,
}

impl Session {
    pub fn new(client: AvatarSdkClient, events: EventBus) -> Self {
        Self {
            client: Arc::new(client),
            catalog: ParameterCatalog::default(),
            poll: PollOptions::default(),
            events,
            active: Mutex::new(None),
        }
    }

    pub fn with_catalog(mut self, catalog: ParameterCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn client(&self) -> &AvatarSdkClient {
        &self.client
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Fetch both parameter listings and build default settings from them
    pub async fn load_settings(&self, selection: &PipelineSelection) -> AsdkResult<Settings> {
        selection.validate()?;

        let (parameter_spec, export_spec) = tokio::try_join!(
            self.client.get_available_parameters(selection),
            self.client.get_available_export_parameters(selection),
        )?;

        let parameter_spec = remove_export_duplicates(parameter_spec, &export_spec);
        let parameters = ConfigTree::from_spec(&parameter_spec, &self.catalog);
        let export = ExportSection::from_spec(&selection.pipeline, &export_spec, &self.catalog);

        info!(
            pipeline = %selection,
            parameters = parameters.len(),
            export_categories = export_spec.len(),
            "Settings loaded"
        );

        Ok(Settings {
            selection: selection.clone(),
            parameter_spec,
            export_spec,
            parameters,
            export,
        })
    }

    /// Cancel the running computation, if any
    pub fn cancel_active(&self) {
        if let Some(token) = self.lock_active().take() {
            token.cancel();
        }
    }

    fn begin_job(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock_active().replace(token.clone()) {
            info!("Superseding previous computation");
            previous.cancel();
        }
        token
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // a poisoned slot only ever holds a token; keep using it
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stage(&self, stage: Stage) {
        info!(stage = %stage, "Stage changed");
        self.events.emit_lossy(AsdkEvent::StageChanged {
            stage,
            timestamp: Utc::now(),
        });
    }

    fn job_progress<J: RemoteJob>(&self) -> impl FnMut(&J) + Send + '_ {
        move |job: &J| {
            self.events.emit_lossy(AsdkEvent::JobProgress {
                job_url: job.url().to_string(),
                kind: J::KIND.to_string(),
                status: job.status().to_string(),
                progress: job.progress(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Submit a photo with `settings`, wait for the avatar, and fetch the preview
    ///
    /// Validation failures are returned before anything is sent.
    pub async fn compute_avatar(
        &self,
        photo: Option<Photo>,
        settings: &Settings,
    ) -> AsdkResult<AvatarOutcome> {
        let photo = photo
            .filter(|p| !p.data.is_empty())
            .ok_or_else(|| AsdkError::Validation("Please select a photo".to_string()))?;
        settings.selection.validate()?;

        let cancel = self.begin_job();

        let request = NewAvatar {
            name: photo.name.clone(),
            photo: photo.data,
            photo_name: photo.name,
            selection: settings.selection.clone(),
            parameters: generate_computation_parameters(&settings.parameters, &self.catalog),
            export_parameters: export_parameters_pair(&settings.export),
        };

        self.stage(Stage::Uploading);
        let created = self.client.create_avatar(&request).await?;

        self.stage(Stage::Computing);
        let avatar = poll_job(
            self.client.as_ref(),
            &created,
            &self.poll,
            &cancel,
            self.job_progress::<AvatarJob>(),
        )
        .await?;

        let exports = self.client.get_exports(&avatar).await?;

        // a failed preview ends the computation, so the full export poll goes with it
        let full_cancel = cancel.child_token();
        let full = resolve_export(
            self.client.as_ref(),
            exports.clone(),
            FULL_EXPORT_INDEX,
            &self.poll,
            &full_cancel,
            self.job_progress::<ExportJob>(),
        );
        let preview = async {
            let result = self.fetch_preview(exports, &cancel).await;
            if result.is_err() {
                full_cancel.cancel();
            }
            result
        };

        let (full_export, preview) = tokio::join!(full, preview);
        let (preview_export, preview_files) = preview?;

        match &full_export {
            Ok(Some(export)) => {
                self.events.emit_lossy(AsdkEvent::ExportReady {
                    export_url: export.url.clone(),
                    files: export.files.len(),
                    timestamp: Utc::now(),
                });
            }
            Ok(None) => warn!(url = %avatar.url, "Avatar has no full export"),
            Err(e) => warn!(url = %avatar.url, error = %e, "Full export did not complete"),
        }

        self.stage(Stage::Done);

        Ok(AvatarOutcome {
            avatar,
            preview_export,
            preview_files,
            full_export,
        })
    }

    async fn fetch_preview(
        &self,
        exports: Vec<ExportJob>,
        cancel: &CancellationToken,
    ) -> AsdkResult<(ExportJob, ArchiveContents)> {
        let export = resolve_export(
            self.client.as_ref(),
            exports,
            VISUAL_EXPORT_INDEX,
            &self.poll,
            cancel,
            self.job_progress::<ExportJob>(),
        )
        .await?
        .ok_or_else(|| AsdkError::NotFound("No avatar preview export found".to_string()))?;

        let url = avatar_file(&export)?.file.clone();

        self.stage(Stage::Downloading);
        let events = &self.events;
        let data = download_with_progress(&self.client, &url, |percent| {
            events.emit_lossy(AsdkEvent::DownloadProgress {
                url: url.clone(),
                percent,
                timestamp: Utc::now(),
            });
        })
        .await?;

        self.stage(Stage::Unpacking);
        let files = extract_archive(data).await?;

        Ok((export, files))
    }
}
