//! # deck2notes
//!
//! Explain PowerPoint slide decks with LLMs.
//!
//! ## Why this crate?
//!
//! A slide deck is a terrible reading format: it carries the speaker's cue
//! words, not the explanation. This crate extracts the text of every slide,
//! asks a chat model to write the explanation the speaker would have given,
//! and assembles the answers into an ordered JSON notes document — tracked
//! through an asynchronous job pipeline so a web layer can upload a deck,
//! return immediately, and poll for the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .pptx upload
//!  │
//!  ├─ 1. Submit    store artifact, create job record (pending)
//!  ├─ 2. Dispatch  supervised queue (or polling directory watcher)
//!  ├─ 3. Extract   per-slide normalised text (zip + XML, no office deps)
//!  ├─ 4. Generate  concurrent chat calls, one per non-empty slide
//!  ├─ 5. Assemble  fan-in, always in slide order
//!  └─ 6. Publish   atomic write of <job_id>.json, job -> done
//! ```
//!
//! Re-running a completed job is a no-op: the output name is derived from
//! the job id, so an existing document short-circuits the pipeline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deck2notes::{Explainer, ExplainConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from OPENAI_API_KEY unless set on the config.
//!     let service = Explainer::new(ExplainConfig::default()).await?;
//!
//!     let bytes = std::fs::read("lecture.pptx")?;
//!     let id = service.submit(&bytes, "lecture.pptx").await?;
//!
//!     // Poll until terminal.
//!     loop {
//!         let report = service.status(&id).await?;
//!         if matches!(report.status, deck2notes::JobStatus::Done | deck2notes::JobStatus::Failed) {
//!             println!("{report:?}");
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deck2notes` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deck2notes = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod deck;
pub mod error;
pub mod generate;
pub mod job;
pub mod output;
pub mod prompts;
pub mod service;
pub mod storage;

mod dispatch;
mod runner;
mod watch;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExplainConfig, ExplainConfigBuilder};
pub use deck::Deck;
pub use error::{ExplainError, GenerateError};
pub use generate::{Generator, OpenAiGenerator};
pub use job::{JobId, JobRecord, JobStatus, JobStore};
pub use output::{DeckNotes, SlideNotes};
pub use service::{Explainer, StatusReport};
