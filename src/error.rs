//! Error types for the deck2notes library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExplainError`] — **Job-fatal**: the job cannot produce a notes
//!   document at all (missing artifact, unparsable deck, exhausted
//!   generation retries). Recorded in the job record as `error_detail` and
//!   surfaced as data through the status query, never thrown back at the
//!   caller of `submit`.
//!
//! * [`GenerateError`] — **Per-call**: a single chat-completion call failed.
//!   Transient kinds (transport failure, rate limiting, timeout, 5xx) are
//!   retried with backoff by the runner; only once retries are exhausted does
//!   the call fail its slide and, under the strict policy, the whole job.
//!
//! The separation keeps the retry decision local: the runner asks
//! [`GenerateError::is_transient`] instead of pattern-matching provider
//! details scattered across the pipeline.

use crate::job::{JobId, JobStatus};
use std::path::PathBuf;
use thiserror::Error;

/// All job-fatal errors produced by the deck2notes pipeline.
///
/// Per-call generation failures use [`GenerateError`] and are wrapped in
/// [`ExplainError::Generation`] only once retries are exhausted.
#[derive(Debug, Error)]
pub enum ExplainError {
    // ── Artifact errors ───────────────────────────────────────────────────
    /// No uploaded artifact could be located for the job id.
    ///
    /// Usually means the dispatch trigger raced ahead of storage, or the
    /// upload directory was cleaned while the job was queued.
    #[error("No uploaded artifact found for job '{id}'\nCheck the upload directory still contains a file whose name embeds the id.")]
    ArtifactNotFound { id: JobId },

    /// The uploaded bytes are not a PowerPoint package.
    #[error("'{name}' is not a valid .pptx package: {detail}")]
    DocumentFormat { name: String, detail: String },

    // ── Generation errors ─────────────────────────────────────────────────
    /// A slide's generation call failed after all retries; the job aborts.
    #[error("Generation failed for slide {slide}: {source}")]
    Generation {
        slide: usize,
        #[source]
        source: GenerateError,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not read or write an artifact on disk.
    #[error("Storage error at '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Job-store errors ──────────────────────────────────────────────────
    /// A status transition moved backwards from a terminal state.
    ///
    /// This never occurs in correct operation; it signals a bug in the
    /// caller, not a runtime condition worth retrying.
    #[error("Invalid job transition for '{id}': {from:?} -> {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The queried job id is not known to the store.
    #[error("Unknown job id '{id}'")]
    UnknownJob { id: JobId },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of a single generation call.
///
/// The runner retries transient kinds with exponential backoff; the others
/// fail the slide immediately.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// Transport-level failure: connection refused, DNS, broken stream.
    #[error("generation service unavailable: {detail}")]
    Unavailable { detail: String },

    /// The service answered with a non-success status.
    #[error("generation service returned HTTP {status}: {detail}")]
    Service { status: u16, detail: String },

    /// Explicit throttling signal (HTTP 429).
    #[error("rate limited by the generation service")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The call exceeded the configured per-call timeout.
    #[error("generation call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl GenerateError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Timeouts are treated the same as transport unavailability. 4xx
    /// service answers (bad API key, malformed request) are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerateError::Unavailable { .. } => true,
            GenerateError::RateLimited { .. } => true,
            GenerateError::Timeout { .. } => true,
            GenerateError::Service { status, .. } => *status >= 500,
        }
    }
}
