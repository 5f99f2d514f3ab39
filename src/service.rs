//! The service facade: the boundary the request-handling layer calls.
//!
//! [`Explainer`] wires the job store, artifact storage, generator, and
//! dispatcher together and exposes exactly two operations to the outside:
//!
//! * [`Explainer::submit`] — store the upload, create the job record,
//!   enqueue the pipeline, return the id immediately. Fails only on
//!   storage errors; a broken deck becomes a `failed` job, not a submit
//!   error.
//! * [`Explainer::status`] — read the job record. Failure is data: a
//!   `failed` job reports its `error_detail`, and only an unknown id is an
//!   `Err`. Polling is side-effect free except for one permitted action,
//!   confirming `done` from the already-published notes document.
//!
//! [`Explainer::watch`] runs the alternative dispatch trigger, the polling
//! directory watcher, on top of the same pipeline.

use crate::config::ExplainConfig;
use crate::dispatch::Dispatcher;
use crate::error::ExplainError;
use crate::generate::{Generator, OpenAiGenerator};
use crate::job::{JobId, JobStatus, JobStore};
use crate::output::DeckNotes;
use crate::runner::PipelineContext;
use crate::storage::Storage;
use crate::watch::{self, DirScanner};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

/// Snapshot of a job's state, shaped for a polling client.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub id: JobId,
    pub source_name: String,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    /// The notes document; present exactly when `status` is `done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<DeckNotes>,
    /// Failure detail; present exactly when `status` is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// The deck-explanation service.
///
/// Cheap to clone-by-`Arc` inside a web layer; all state is shared.
pub struct Explainer {
    ctx: Arc<PipelineContext>,
    dispatcher: Dispatcher,
}

impl Explainer {
    /// Build a service with the production OpenAI-backed generator.
    ///
    /// Must be called from within a tokio runtime (the dispatcher
    /// supervisor is spawned here). Creates the upload and output
    /// directories if needed.
    pub async fn new(config: ExplainConfig) -> Result<Self, ExplainError> {
        let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::from_config(&config)?);
        Self::with_generator(config, generator).await
    }

    /// Build a service with a caller-supplied generator.
    ///
    /// The seam for tests and for callers who need custom middleware
    /// (caching, request shaping) around the generation service.
    pub async fn with_generator(
        config: ExplainConfig,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, ExplainError> {
        let storage = Storage::new(&config.upload_dir, &config.output_dir);
        storage.ensure_dirs().await?;

        let ctx = Arc::new(PipelineContext {
            config,
            store: JobStore::new(),
            storage,
            generator,
        });
        let dispatcher = Dispatcher::spawn(Arc::clone(&ctx));
        Ok(Self { ctx, dispatcher })
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.ctx.config
    }

    /// Accept an uploaded deck and schedule its pipeline run.
    ///
    /// Returns as soon as the artifact is stored and the job is queued;
    /// the actual work happens in the background. The bytes are not
    /// validated here — an unparsable deck surfaces later as a `failed`
    /// job, per the "failure is data" contract.
    pub async fn submit(&self, bytes: &[u8], source_name: &str) -> Result<JobId, ExplainError> {
        let record = self.ctx.store.create(source_name);
        let id = record.id.clone();

        match self
            .ctx
            .storage
            .store_upload(bytes, &id, source_name)
            .await
        {
            Ok(stored_name) => self.ctx.store.set_stored_name(&id, &stored_name),
            Err(err) => {
                // The record exists but no artifact does; fail it so a
                // status poll tells the truth, then report the storage
                // error to the submitter.
                let _ = self.ctx.store.mark_failed(&id, err.to_string());
                return Err(err);
            }
        }

        info!(%id, source_name, "deck submitted");
        self.dispatcher.dispatch(id.clone());
        Ok(id)
    }

    /// Report the current state of a job.
    ///
    /// # Errors
    /// [`ExplainError::UnknownJob`] when the id was never submitted.
    pub async fn status(&self, id: &JobId) -> Result<StatusReport, ExplainError> {
        let record = self
            .ctx
            .store
            .get(id)
            .ok_or_else(|| ExplainError::UnknownJob { id: id.clone() })?;

        // Completion is provable from disk alone: if the notes document is
        // already published while the record still says pending/processing
        // (runner mid-transition, or state rebuilt after a restart),
        // confirm it. This is the one side effect a poll may have.
        let record = if !record.status.is_terminal() && self.ctx.storage.notes_exist(id).await {
            self.ctx
                .store
                .mark_done(id, self.ctx.storage.notes_path(id))?;
            self.ctx
                .store
                .get(id)
                .ok_or_else(|| ExplainError::UnknownJob { id: id.clone() })?
        } else {
            record
        };

        let notes = match record.status {
            JobStatus::Done => Some(self.ctx.storage.read_notes(id).await?),
            _ => None,
        };

        Ok(StatusReport {
            id: record.id,
            source_name: record.source_name,
            submitted_at: record.submitted_at,
            status: record.status,
            notes,
            error_detail: record.error_detail,
        })
    }

    /// Run the polling watcher over the upload directory, forever.
    ///
    /// Newly appeared artifacts are dispatched once their size is stable
    /// across two consecutive scans; files present at startup are skipped.
    /// Scan errors are logged and the next tick retries.
    pub async fn watch(&self) -> Result<(), ExplainError> {
        let dir = self.ctx.storage.upload_dir().to_path_buf();
        info!(dir = %dir.display(), interval_ms = self.ctx.config.poll_interval_ms, "watching upload directory");

        let mut scanner = DirScanner::new();
        let mut ticker = interval(Duration::from_millis(self.ctx.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let listing = match watch::list_dir(&dir).await {
                Ok(listing) => listing,
                Err(err) => {
                    warn!(error = %err, "upload directory scan failed");
                    continue;
                }
            };

            for name in scanner.observe(&listing) {
                let (id, source_name) = watch::identify(&name);
                self.ctx.store.adopt(id.clone(), &source_name, &name);
                info!(%id, name, "new artifact discovered");
                self.dispatcher.dispatch(id);
            }
        }
    }
}
