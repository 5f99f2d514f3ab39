//! The immediate dispatch trigger: a supervised job queue.
//!
//! Submission must return before the pipeline runs, but detached
//! fire-and-forget tasks leave nobody to bound parallelism or notice a
//! panic. The dispatcher owns both concerns: job ids go into an mpsc
//! channel, a single supervisor task drains it, and a semaphore caps how
//! many runner executions are in flight at once
//! (`config.max_concurrent_jobs`). Runner outcomes are observed and logged
//! here; job-level failures are already recorded in the job store by the
//! runner itself, so the supervisor only has to shout about invariant
//! violations.

use crate::job::JobId;
use crate::runner::{self, PipelineContext};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, warn};

/// Handle for enqueueing jobs. Cloning shares the same queue.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<JobId>,
}

impl Dispatcher {
    /// Start the supervisor loop on the current runtime.
    pub fn spawn(ctx: Arc<PipelineContext>) -> Dispatcher {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobId>();
        let limit = ctx.config.max_concurrent_jobs;
        let semaphore = Arc::new(Semaphore::new(limit));

        tokio::spawn(async move {
            while let Some(id) = rx.recv().await {
                // Closed only on runtime shutdown; treat as a drain signal.
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let _permit = permit;
                    debug!(%id, "runner starting");
                    match runner::run_job(&ctx, &id).await {
                        Ok(status) => debug!(%id, ?status, "runner finished"),
                        Err(err) => {
                            // Unknown id or an illegal transition: a bug,
                            // not a job outcome.
                            error!(%id, error = %err, "runner invariant violation");
                        }
                    }
                });
            }
            debug!("dispatcher supervisor stopped");
        });

        Dispatcher { tx }
    }

    /// Enqueue a job for execution. Never blocks the caller.
    pub fn dispatch(&self, id: JobId) {
        if self.tx.send(id.clone()).is_err() {
            // The supervisor is gone; the job stays pending and a watcher
            // or restart can pick it up via the on-disk artifact.
            warn!(%id, "dispatcher is not running, job left pending");
        }
    }
}
