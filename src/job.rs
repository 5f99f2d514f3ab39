//! Job identity, lifecycle state, and the in-memory job store.
//!
//! A [`JobRecord`] tracks one submitted deck from `pending` to a terminal
//! `done`/`failed`. The [`JobStore`] owns the id-to-record map and is the
//! single source of truth for status queries; the pipeline runner is the
//! only writer of status fields in normal operation.
//!
//! ## Transition rules
//!
//! ```text
//! Pending ──▶ Processing ──▶ Done
//!    │             │
//!    │             └───────▶ Failed
//!    ├──────────────────────▶ Done     (idempotency check fired pre-extraction)
//!    └──────────────────────▶ Failed   (artifact missing before extraction)
//! ```
//!
//! Terminal states never move. `Done -> Done` is permitted as a no-op so a
//! status query confirming completion from the persisted artifact cannot
//! race the runner into an error. Anything else is an
//! [`ExplainError::InvalidTransition`], which signals a bug rather than a
//! runtime condition.

use crate::error::ExplainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Opaque unique job identifier, assigned at submission.
///
/// Rendered as a UUID string; artifact file names embed it so that a job's
/// output (`<id>.json`) and its upload can be located from the id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    /// Recover the id embedded in a stored artifact name, if any.
    ///
    /// Upload names look like `20240131120000_<uuid>_deck.pptx`; output
    /// names are `<uuid>.json`. Any underscore-separated segment (or the
    /// file stem itself) that parses as a UUID counts.
    pub fn from_artifact_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json").unwrap_or(name);
        stem.split('_')
            .find(|segment| Uuid::parse_str(segment).is_ok())
            .map(|segment| JobId(segment.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet picked up by a runner.
    Pending,
    /// A runner is extracting and generating.
    Processing,
    /// Notes document persisted; `result_location` is set.
    Done,
    /// The job aborted; `error_detail` is set.
    Failed,
}

impl JobStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether moving to `next` is a legal forward transition.
    fn allows(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Done) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Done) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            // Idempotent completion confirmation.
            (JobStatus::Done, JobStatus::Done) => true,
            _ => false,
        }
    }
}

/// The tracked state of one submitted deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique id, immutable.
    pub id: JobId,
    /// Original artifact name as submitted, immutable.
    pub source_name: String,
    /// File name of the stored upload in the upload directory.
    ///
    /// Embeds the id; the runner resolves the artifact through this first
    /// and falls back to an id-substring scan if the record was rebuilt.
    pub stored_name: Option<String>,
    /// Submission timestamp, immutable.
    pub submitted_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Path of the persisted notes document. Set if and only if `Done`.
    pub result_location: Option<PathBuf>,
    /// Human-readable failure detail. Set only when `Failed`.
    pub error_detail: Option<String>,
}

/// Shared in-memory map from job id to [`JobRecord`].
///
/// Cloning is cheap (an `Arc`); every clone observes the same records.
/// Concurrent `get`/`update` are safe; concurrent writers to the same id
/// are not expected but resolve as last-writer-wins without corrupting the
/// record.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with a fresh id in `Pending` state.
    pub fn create(&self, source_name: &str) -> JobRecord {
        let record = JobRecord {
            id: JobId::new(),
            source_name: source_name.to_string(),
            stored_name: None,
            submitted_at: Utc::now(),
            status: JobStatus::Pending,
            result_location: None,
            error_detail: None,
        };
        self.inner
            .write()
            .expect("job store lock poisoned")
            .insert(record.id.clone(), record.clone());
        record
    }

    /// Adopt a job discovered outside `submit` (watcher mode), keeping the
    /// id embedded in its artifact name.
    ///
    /// Returns the existing record unchanged when the id is already known,
    /// so a watcher re-observing a file cannot reset job state.
    pub fn adopt(&self, id: JobId, source_name: &str, stored_name: &str) -> JobRecord {
        let mut jobs = self.inner.write().expect("job store lock poisoned");
        jobs.entry(id.clone())
            .or_insert_with(|| JobRecord {
                id,
                source_name: source_name.to_string(),
                stored_name: Some(stored_name.to_string()),
                submitted_at: Utc::now(),
                status: JobStatus::Pending,
                result_location: None,
                error_detail: None,
            })
            .clone()
    }

    /// Look up a record by id.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.inner
            .read()
            .expect("job store lock poisoned")
            .get(id)
            .cloned()
    }

    /// Record the name the upload was stored under.
    pub fn set_stored_name(&self, id: &JobId, stored_name: &str) {
        if let Some(record) = self
            .inner
            .write()
            .expect("job store lock poisoned")
            .get_mut(id)
        {
            record.stored_name = Some(stored_name.to_string());
        }
    }

    /// Transition a job to `Processing`.
    pub fn mark_processing(&self, id: &JobId) -> Result<(), ExplainError> {
        self.transition(id, JobStatus::Processing, |_| {})
    }

    /// Transition a job to `Done` with its result location.
    pub fn mark_done(&self, id: &JobId, result_location: PathBuf) -> Result<(), ExplainError> {
        self.transition(id, JobStatus::Done, move |record| {
            record.result_location = Some(result_location);
            record.error_detail = None;
        })
    }

    /// Transition a job to `Failed` with a failure detail.
    pub fn mark_failed(&self, id: &JobId, detail: String) -> Result<(), ExplainError> {
        self.transition(id, JobStatus::Failed, move |record| {
            record.error_detail = Some(detail);
            record.result_location = None;
        })
    }

    fn transition(
        &self,
        id: &JobId,
        to: JobStatus,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<(), ExplainError> {
        let mut jobs = self.inner.write().expect("job store lock poisoned");
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| ExplainError::UnknownJob { id: id.clone() })?;
        if !record.status.allows(to) {
            return Err(ExplainError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to,
            });
        }
        record.status = to;
        apply(record);
        Ok(())
    }
}
