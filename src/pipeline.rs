use crate::config::{AppConfig, ImagePolicy};
use crate::drive::{self, Storage, StorageError};
use crate::etsy::{self, ListingDefaults, Marketplace, PublishError, PublishedListing};
use crate::listing::{GenerationError, GenerationSettings, ProductInfo, generate_listing_content};
use crate::llm::{LlmError, VisionModel};
use crate::models::{ImageRecord, ListingContent, PassOutcome, PassReport, StageReport};
use crate::workspace::{self, LocalDownload, WorkspaceError};
use serde_json::{Value, json};
use std::{future::Future, path::PathBuf, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// Credentials missing or rejected.
    Auth,
    /// Nothing to act on.
    NotFound,
    /// Network, storage, or API failure.
    Transient,
    /// Data that breaks a contract, such as a malformed model reply.
    Validation,
}

impl PipelineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineErrorKind::Auth => "auth",
            PipelineErrorKind::NotFound => "not_found",
            PipelineErrorKind::Transient => "transient",
            PipelineErrorKind::Validation => "validation",
        }
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

impl PipelineError {
    pub fn new(stage: &'static str, kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    fn from_storage(stage: &'static str, err: &StorageError) -> Self {
        let kind = if err.is_auth() {
            PipelineErrorKind::Auth
        } else if matches!(err, StorageError::Status(reqwest::StatusCode::NOT_FOUND)) {
            PipelineErrorKind::NotFound
        } else {
            PipelineErrorKind::Transient
        };
        Self::new(stage, kind, err.to_string())
    }

    fn from_workspace(stage: &'static str, err: &WorkspaceError) -> Self {
        match err {
            WorkspaceError::Storage(inner) => Self::from_storage(stage, inner),
            WorkspaceError::EmptyFolderName(_) | WorkspaceError::InvalidFileName(_) => {
                Self::new(stage, PipelineErrorKind::Validation, err.to_string())
            }
            WorkspaceError::Io { .. } => {
                Self::new(stage, PipelineErrorKind::Transient, err.to_string())
            }
        }
    }

    fn from_generation(stage: &'static str, err: &GenerationError) -> Self {
        let kind = match err {
            GenerationError::Model(LlmError::MissingApiKey) => PipelineErrorKind::Auth,
            GenerationError::Model(LlmError::Status(status))
                if *status == reqwest::StatusCode::UNAUTHORIZED
                    || *status == reqwest::StatusCode::FORBIDDEN =>
            {
                PipelineErrorKind::Auth
            }
            err if err.is_validation() => PipelineErrorKind::Validation,
            _ => PipelineErrorKind::Transient,
        };
        Self::new(stage, kind, err.to_string())
    }

    fn from_publish(stage: &'static str, err: &PublishError) -> Self {
        let kind = match err {
            PublishError::Price(_) => PipelineErrorKind::Validation,
            other => match other.marketplace_error() {
                Some(inner) if inner.is_auth() => PipelineErrorKind::Auth,
                _ => PipelineErrorKind::Transient,
            },
        };
        Self::new(stage, kind, err.to_string())
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

/// Values the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub unprocessed_folder_id: String,
    pub processed_folder_id: String,
    pub image_policy: ImagePolicy,
    pub download_root: PathBuf,
    pub generation: GenerationSettings,
    pub listing_defaults: ListingDefaults,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            unprocessed_folder_id: config.drive.unprocessed_folder_id.clone(),
            processed_folder_id: config.drive.processed_folder_id.clone(),
            image_policy: config.drive.image_policy,
            download_root: config.download_root.clone(),
            generation: GenerationSettings {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            },
            listing_defaults: ListingDefaults {
                taxonomy_id: config.etsy.taxonomy_id,
                shipping_profile_id: config.etsy.shipping_profile_id,
            },
        }
    }
}

/// Single-item orchestrator: list, pick the first item, download, generate,
/// publish, move, clean up.
///
/// The product folder moves to processed only after a listing exists. The
/// local download is removed on every path that produced one.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    model: Arc<dyn VisionModel>,
    marketplace: Arc<dyn Marketplace>,
    settings: Arc<PipelineSettings>,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        model: Arc<dyn VisionModel>,
        marketplace: Arc<dyn Marketplace>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            storage,
            model,
            marketplace,
            settings: Arc::new(settings),
        }
    }

    pub async fn run_once(&self) -> PassReport {
        let pass_id = Uuid::new_v4().to_string();
        let span = info_span!("pass", pass_id = %pass_id);
        let mut stages = Vec::new();
        let outcome = self.run_stages(&mut stages).instrument(span).await;
        let label = match &outcome {
            PassOutcome::Idle => "idle",
            PassOutcome::Published { .. } => "published",
            PassOutcome::Failed { .. } => "failed",
        };
        crate::metrics::pass_finished(label);
        PassReport {
            pass_id,
            outcome,
            stages,
        }
    }

    async fn run_stages(&self, stages: &mut Vec<StageReport>) -> PassOutcome {
        info!(target = "lister.pipeline", "pass_started");

        let records = match self
            .capture_stage("list_images", stages, self.list_images())
            .await
        {
            Ok(records) => records,
            Err(err) => return failed(&err),
        };

        let record = match self
            .capture_stage("select_item", stages, select_item(records))
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(target = "lister.pipeline", "no_images_to_process");
                return PassOutcome::Idle;
            }
            Err(err) => return failed(&err),
        };

        let download = match self
            .capture_stage("download", stages, self.download(&record))
            .await
        {
            Ok(download) => download,
            Err(err) => return failed(&err),
        };

        let outcome = self.process_download(&record, &download, stages).await;

        // Cleanup runs whatever happened after the download.
        let _ = self
            .capture_stage("cleanup", stages, self.cleanup(&download))
            .await;

        match &outcome {
            PassOutcome::Published { listing_id, .. } => {
                info!(target = "lister.pipeline", listing_id, folder_id = %record.folder_id, "pass_completed")
            }
            PassOutcome::Failed { stage, message, .. } => {
                warn!(target = "lister.pipeline", stage = %stage, error = %message, folder_id = %record.folder_id, "pass_failed_folder_left_in_place")
            }
            PassOutcome::Idle => {}
        }
        outcome
    }

    async fn process_download(
        &self,
        record: &ImageRecord,
        download: &LocalDownload,
        stages: &mut Vec<StageReport>,
    ) -> PassOutcome {
        let (content, product) = match self
            .capture_stage("generate_content", stages, self.generate(record, download))
            .await
        {
            Ok(generated) => generated,
            Err(err) => return failed(&err),
        };

        let published = match self
            .capture_stage(
                "publish_listing",
                stages,
                self.publish(&content, download, &product),
            )
            .await
        {
            Ok(published) => published,
            Err(err) => return failed(&err),
        };

        if let Err(err) = self
            .capture_stage("move_folder", stages, self.move_folder(record))
            .await
        {
            error!(
                target = "lister.pipeline",
                listing_id = published.listing_id,
                folder_id = %record.folder_id,
                "listing_created_but_folder_not_moved"
            );
            return failed(&err);
        }

        PassOutcome::Published {
            listing_id: published.listing_id,
            folder_id: record.folder_id.clone(),
            image_attached: published.image_attached,
        }
    }

    async fn list_images(&self) -> Result<StageOutcome<Vec<ImageRecord>>, PipelineError> {
        let records = drive::list_image_records(
            self.storage.as_ref(),
            &self.settings.unprocessed_folder_id,
            self.settings.image_policy,
        )
        .await;
        let output = json!({
            "count": records.len(),
            "folders": records.iter().take(5).map(|r| r.folder_name.as_str()).collect::<Vec<_>>(),
        });
        Ok(StageOutcome::new(records, output))
    }

    async fn download(
        &self,
        record: &ImageRecord,
    ) -> Result<StageOutcome<LocalDownload>, PipelineError> {
        let download = workspace::download_image(
            self.storage.as_ref(),
            &self.settings.download_root,
            &record.image_id,
            &record.image_name,
            &record.folder_name,
        )
        .await
        .map_err(|err| PipelineError::from_workspace("download", &err))?;
        let output = json!({
            "path": download.path.display().to_string(),
            "sanitized_folder_name": download.sanitized_folder_name,
        });
        Ok(StageOutcome::new(download, output))
    }

    async fn generate(
        &self,
        record: &ImageRecord,
        download: &LocalDownload,
    ) -> Result<StageOutcome<(ListingContent, ProductInfo)>, PipelineError> {
        let (content, product) = generate_listing_content(
            self.model.as_ref(),
            &download.path,
            &record.folder_name,
            self.settings.generation,
        )
        .await
        .map_err(|err| PipelineError::from_generation("generate_content", &err))?;
        let output = json!({
            "title": content.title,
            "tag_count": content.tags.len(),
            "product": product,
        });
        Ok(StageOutcome::new((content, product), output))
    }

    async fn publish(
        &self,
        content: &ListingContent,
        download: &LocalDownload,
        product: &ProductInfo,
    ) -> Result<StageOutcome<PublishedListing>, PipelineError> {
        let published = etsy::publish_listing(
            self.marketplace.as_ref(),
            content,
            &download.path,
            product,
            self.settings.listing_defaults,
        )
        .await
        .map_err(|err| PipelineError::from_publish("publish_listing", &err))?;
        let output = json!(published);
        Ok(StageOutcome::new(published, output))
    }

    async fn move_folder(&self, record: &ImageRecord) -> Result<StageOutcome<()>, PipelineError> {
        let previous = drive::move_folder_to_processed(
            self.storage.as_ref(),
            &record.folder_id,
            &self.settings.processed_folder_id,
        )
        .await
        .map_err(|err| PipelineError::from_storage("move_folder", &err))?;
        Ok(StageOutcome::new(
            (),
            json!({
                "folder_id": record.folder_id,
                "previous_parents": previous,
                "processed_folder_id": self.settings.processed_folder_id,
            }),
        ))
    }

    async fn cleanup(&self, download: &LocalDownload) -> Result<StageOutcome<usize>, PipelineError> {
        let removed =
            workspace::cleanup_download(&self.settings.download_root, &download.sanitized_folder_name)
                .await;
        Ok(StageOutcome::new(removed, json!({ "removed_files": removed })))
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms, result.is_ok());
        match result {
            Ok(outcome) => {
                info!(target = "lister.pipeline", stage = name, elapsed_ms = elapsed_ms as u64, "stage_completed");
                stages.push(StageReport::new(name, elapsed_ms, outcome.output));
                Ok(outcome.value)
            }
            Err(err) => {
                error!(target = "lister.pipeline", stage = name, kind = err.kind().as_str(), error = %err.detail(), "stage_failed");
                stages.push(StageReport::new(
                    name,
                    elapsed_ms,
                    json!({ "error": err.detail(), "kind": err.kind().as_str() }),
                ));
                Err(err)
            }
        }
    }
}

async fn select_item(
    records: Vec<ImageRecord>,
) -> Result<StageOutcome<Option<ImageRecord>>, PipelineError> {
    let remaining = records.len().saturating_sub(1);
    let selected = records.into_iter().next();
    let output = json!({
        "selected": selected,
        "deferred": remaining,
    });
    Ok(StageOutcome::new(selected, output))
}

fn failed(err: &PipelineError) -> PassOutcome {
    PassOutcome::Failed {
        stage: err.stage().to_string(),
        kind: err.kind().as_str().to_string(),
        message: err.detail().to_string(),
        folder_moved: false,
    }
}
