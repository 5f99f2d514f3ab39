//! The pipeline runner: one submitted deck from artifact to notes document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! job id
//!  │
//!  ├─ 1. Resolve   locate the uploaded artifact (fail: ArtifactNotFound)
//!  ├─ 2. Idempotency  notes already published? confirm done, stop
//!  ├─ 3. Extract   parse deck, per-slide normalised text
//!  ├─ 4. Fan-out   one generation call per non-empty slide, bounded
//!  ├─ 5. Fan-in    wait for all, reassemble in slide order
//!  └─ 6. Publish   atomic write, job -> done
//! ```
//!
//! Step 2 makes re-invocation for the same id a no-op, which the polling
//! watcher relies on: observing an artifact twice must not generate twice.
//!
//! ## Partial-failure policy
//!
//! Strict: the first generation failure (after retries) aborts the job.
//! The fan-in loop returns the error, dropping the stream and with it any
//! in-flight calls; nothing partial is persisted and the job transitions to
//! `failed` carrying the first error's detail.

use crate::config::ExplainConfig;
use crate::deck::Deck;
use crate::error::{ExplainError, GenerateError};
use crate::generate::Generator;
use crate::job::{JobId, JobStatus, JobStore};
use crate::output::{DeckNotes, SlideNotes};
use crate::storage::Storage;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Everything a runner execution needs; shared by the dispatch trigger and
/// the service facade.
pub(crate) struct PipelineContext {
    pub config: ExplainConfig,
    pub store: JobStore,
    pub storage: Storage,
    pub generator: Arc<dyn Generator>,
}

/// Execute the pipeline for one job and record its terminal state.
///
/// Returns the terminal status reached. `Err` is reserved for invariant
/// violations (unknown id, illegal transition): job-level failures are
/// recorded in the store and reported as `Ok(JobStatus::Failed)`.
pub(crate) async fn run_job(
    ctx: &PipelineContext,
    id: &JobId,
) -> Result<JobStatus, ExplainError> {
    let record = ctx
        .store
        .get(id)
        .ok_or_else(|| ExplainError::UnknownJob { id: id.clone() })?;

    // A re-triggered terminal job never reruns; `done` re-confirmation is
    // handled inside execute via the idempotency check.
    if record.status == JobStatus::Failed {
        debug!(%id, "job already failed, not re-running");
        return Ok(JobStatus::Failed);
    }

    let started = Instant::now();
    match execute(ctx, id).await {
        Ok(location) => {
            ctx.store.mark_done(id, location)?;
            info!(%id, elapsed_ms = started.elapsed().as_millis() as u64, "job done");
            Ok(JobStatus::Done)
        }
        Err(ExplainError::InvalidTransition { id, from, to }) => {
            Err(ExplainError::InvalidTransition { id, from, to })
        }
        Err(err) => {
            warn!(%id, error = %err, "job failed");
            ctx.store.mark_failed(id, err.to_string())?;
            Ok(JobStatus::Failed)
        }
    }
}

/// Run steps 1-6; returns the location of the published notes document.
async fn execute(ctx: &PipelineContext, id: &JobId) -> Result<PathBuf, ExplainError> {
    let record = ctx
        .store
        .get(id)
        .ok_or_else(|| ExplainError::UnknownJob { id: id.clone() })?;

    // Step 1: resolve the uploaded artifact.
    let upload = ctx
        .storage
        .find_upload(id, record.stored_name.as_deref())
        .await?
        .ok_or_else(|| ExplainError::ArtifactNotFound { id: id.clone() })?;

    // Step 2: idempotency check. The output name is derived from the id, so
    // existence of the file is proof of completion.
    if ctx.storage.notes_exist(id).await {
        info!(%id, "notes already published, skipping generation");
        return Ok(ctx.storage.notes_path(id));
    }

    ctx.store.mark_processing(id)?;

    // Step 3: extract.
    let bytes = ctx.storage.read_upload(&upload).await?;
    let deck = Deck::parse(&bytes, &record.source_name)?;
    let texts: Vec<(usize, String)> = deck.slide_texts().collect();
    info!(%id, slides = texts.len(), "extracted slide text");

    // Steps 4-5: fan out, fan in.
    let slides = explain_slides(&ctx.generator, &ctx.config, texts).await?;

    // Step 6: publish atomically.
    ctx.storage.write_notes(id, &DeckNotes { slides }).await
}

/// Fan generation calls out over the non-empty slides and reassemble the
/// results in slide order.
///
/// Concurrency is bounded by `config.concurrency`; completion order is
/// irrelevant because results carry their `slide_index` and are sorted at
/// the fan-in barrier. Empty slides are assigned an empty result without a
/// generation call.
async fn explain_slides(
    generator: &Arc<dyn Generator>,
    config: &ExplainConfig,
    texts: Vec<(usize, String)>,
) -> Result<Vec<SlideNotes>, ExplainError> {
    let total = texts.len();
    let mut results = stream::iter(texts.into_iter().map(|(slide_index, text)| {
        let generator = Arc::clone(generator);
        let config = config.clone();
        async move {
            if text.trim().is_empty() {
                debug!(slide = slide_index, "no extractable text, skipping generation");
                return Ok(SlideNotes {
                    slide_index,
                    generated_texts: Vec::new(),
                });
            }
            match generate_with_retry(generator.as_ref(), slide_index, &text, &config).await {
                Ok(generated_texts) => Ok(SlideNotes {
                    slide_index,
                    generated_texts,
                }),
                Err(source) => Err(ExplainError::Generation {
                    slide: slide_index,
                    source,
                }),
            }
        }
    }))
    .buffer_unordered(config.concurrency);

    let mut slides = Vec::with_capacity(total);
    while let Some(result) = results.next().await {
        // Strict policy: the first failure aborts. Dropping the stream
        // cancels whatever is still in flight.
        slides.push(result?);
    }
    drop(results);

    slides.sort_by_key(|s| s.slide_index);
    Ok(slides)
}

/// One slide's generation call with per-call timeout and backoff retry.
///
/// Transient failures (transport, throttling, timeout, 5xx) are retried up
/// to `config.max_retries` times with exponential backoff
/// (`retry_backoff_ms * 2^attempt`); permanent failures return immediately.
async fn generate_with_retry(
    generator: &dyn Generator,
    slide: usize,
    text: &str,
    config: &ExplainConfig,
) -> Result<Vec<String>, GenerateError> {
    let mut last_err: Option<GenerateError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                slide,
                attempt,
                max = config.max_retries,
                backoff_ms = backoff,
                "retrying generation"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = generator.generate(text);
        match timeout(Duration::from_secs(config.api_timeout_secs), call).await {
            Ok(Ok(texts)) => return Ok(texts),
            Ok(Err(err)) => {
                if !err.is_transient() {
                    return Err(err);
                }
                warn!(slide, attempt = attempt + 1, error = %err, "generation attempt failed");
                last_err = Some(err);
            }
            Err(_elapsed) => {
                let err = GenerateError::Timeout {
                    secs: config.api_timeout_secs,
                };
                warn!(slide, attempt = attempt + 1, error = %err, "generation attempt timed out");
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or(GenerateError::Unavailable {
        detail: "no attempt was made".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted generator: fails the first `fail_first` calls transiently,
    /// then echoes the input.
    struct FlakyGenerator {
        calls: AtomicUsize,
        fail_first: usize,
        permanent: bool,
        delay_ms: u64,
    }

    impl FlakyGenerator {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: 0,
                permanent: false,
                delay_ms: 0,
            }
        }
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        async fn generate(&self, text: &str) -> Result<Vec<String>, GenerateError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if n < self.fail_first {
                if self.permanent {
                    return Err(GenerateError::Service {
                        status: 401,
                        detail: "bad key".into(),
                    });
                }
                return Err(GenerateError::Unavailable {
                    detail: "blip".into(),
                });
            }
            Ok(vec![format!("about: {text}")])
        }
    }

    fn fast_config() -> ExplainConfig {
        ExplainConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .api_timeout_secs(1)
            .concurrency(4)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let generator = FlakyGenerator {
            fail_first: 2,
            ..FlakyGenerator::ok()
        };
        let out = generate_with_retry(&generator, 1, "text", &fast_config())
            .await
            .unwrap();
        assert_eq!(out, vec!["about: text".to_string()]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let generator = FlakyGenerator {
            fail_first: 10,
            permanent: true,
            ..FlakyGenerator::ok()
        };
        let err = generate_with_retry(&generator, 1, "text", &fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Service { status: 401, .. }));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_exhaust_with_last_error() {
        let generator = FlakyGenerator {
            fail_first: 10,
            ..FlakyGenerator::ok()
        };
        let err = generate_with_retry(&generator, 1, "text", &fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Unavailable { .. }));
        // initial attempt + max_retries
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_call_times_out_as_transient() {
        let generator = FlakyGenerator {
            delay_ms: 2_000,
            ..FlakyGenerator::ok()
        };
        let config = ExplainConfig::builder()
            .max_retries(0)
            .api_timeout_secs(1)
            .build()
            .unwrap();
        let err = generate_with_retry(&generator, 1, "text", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Timeout { secs: 1 }));
    }

    #[tokio::test]
    async fn fan_in_preserves_slide_order() {
        // Later slides finish first; output must still be 1..=4.
        struct InverseLatency;
        #[async_trait]
        impl Generator for InverseLatency {
            async fn generate(&self, text: &str) -> Result<Vec<String>, GenerateError> {
                let slide: u64 = text.parse().unwrap();
                sleep(Duration::from_millis(40u64.saturating_sub(slide * 10))).await;
                Ok(vec![text.to_string()])
            }
        }

        let generator: Arc<dyn Generator> = Arc::new(InverseLatency);
        let texts = (1..=4).map(|i| (i, i.to_string())).collect();
        let slides = explain_slides(&generator, &fast_config(), texts)
            .await
            .unwrap();
        let order: Vec<usize> = slides.iter().map(|s| s.slide_index).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_slides_never_reach_the_generator() {
        let generator = Arc::new(FlakyGenerator::ok());
        let texts = vec![
            (1, "real".to_string()),
            (2, String::new()),
            (3, "   ".to_string()),
        ];
        let slides = explain_slides(
            &(Arc::clone(&generator) as Arc<dyn Generator>),
            &fast_config(),
            texts,
        )
        .await
        .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(slides[1].generated_texts.is_empty());
        assert!(slides[2].generated_texts.is_empty());
    }

    #[tokio::test]
    async fn first_failure_aborts_the_fan_out() {
        struct FailSecond;
        #[async_trait]
        impl Generator for FailSecond {
            async fn generate(&self, text: &str) -> Result<Vec<String>, GenerateError> {
                if text == "2" {
                    return Err(GenerateError::Service {
                        status: 400,
                        detail: "bad".into(),
                    });
                }
                Ok(vec![text.to_string()])
            }
        }

        let generator: Arc<dyn Generator> = Arc::new(FailSecond);
        let texts = (1..=3).map(|i| (i, i.to_string())).collect();
        let err = explain_slides(&generator, &fast_config(), texts)
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::Generation { slide: 2, .. }));
    }
}
