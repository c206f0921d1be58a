//! Enrichment worker pool.
//!
//! A job is processed as:
//!
//! 1. Existence check: a missing event (removed by a reorg upstream) is a
//!    skip, never a failure. A job whose type or noun disagrees with the
//!    stored row fails permanently; everything after this step reads the
//!    stored row, not the job payload.
//! 2. Resolution: the party's name and the hourly price are resolved
//!    concurrently through the [`CacheCoordinator`]. Each side may fail on
//!    its own; whatever resolved is kept.
//! 3. Write-back: one transactional `update_enrichment`. Zero rows affected
//!    gets one delayed retry, then a warning.
//! 4. Outcome: if any resolver failed, the job is reported as a retryable
//!    failure so the queue's backoff schedules another attempt; fields that
//!    stay unresolved after the ceiling are simply left unset.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use super::{JobQueue, JobRecord, JobState};
use crate::cache::CacheCoordinator;
use crate::domain::{Clock, Enrichment, EventKind, build_headline, round_cents};
use crate::persistence::{EventStore, StoreError};
use crate::resolver::ResolveError;

/// Default number of jobs processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default delay before retrying a write that affected no rows.
pub const DEFAULT_WRITE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Pause after a queue error before asking for the next job.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum jobs in flight.
    pub concurrency: usize,
    /// Delay before the single retry of a zero-row write.
    pub write_retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            write_retry_delay: DEFAULT_WRITE_RETRY_DELAY,
        }
    }
}

/// Successful end of one job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Enrichment written; `rows` is what the final write affected.
    Enriched {
        /// Rows affected.
        rows: u64,
    },
    /// The target event does not exist.
    Skipped,
}

/// Failed job attempt.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// One or more external facts could not be resolved. Whatever did
    /// resolve has already been written.
    #[error("unresolved: {}", .0.join("; "))]
    Unresolved(Vec<String>),

    /// The job payload disagrees with the stored event.
    #[error("job does not match stored event: {0}")]
    Mismatch(String),

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    /// Returns `true` if another attempt might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unresolved(_) => true,
            Self::Mismatch(_) => false,
            Self::Store(StoreError::CorruptRow { .. } | StoreError::OutOfRange { .. }) => false,
            Self::Store(_) => true,
        }
    }
}

/// Pulls enrichment jobs and writes their results back to the event store.
#[derive(Debug)]
pub struct EnrichmentWorker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn EventStore>,
    cache: CacheCoordinator,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl EnrichmentWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn EventStore>,
        cache: CacheCoordinator,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            cache,
            clock,
            config,
        }
    }

    /// Runs the pool until `shutdown` turns `true`, then waits for
    /// in-flight jobs to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        tracing::info!(concurrency = self.config.concurrency, "enrichment worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = self.queue.next() => next,
            };

            match next {
                Ok(record) => {
                    let worker = Arc::clone(&self);
                    tasks.spawn(async move {
                        worker.handle(record).await;
                        drop(permit);
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "job queue unavailable");
                    self.clock.sleep(QUEUE_ERROR_BACKOFF).await;
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "enrichment task panicked");
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "enrichment worker draining");
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "enrichment task panicked");
            }
        }
        tracing::info!("enrichment worker stopped");
    }

    /// Processes one claimed job and reports the result to the queue.
    pub async fn handle(&self, record: JobRecord) {
        let job_id = record.job_id;
        let event_id = record.job.event_id.clone();

        let reported = match self.process(&record).await {
            Ok(JobOutcome::Enriched { rows }) => {
                tracing::info!(%job_id, %event_id, rows, attempt = record.attempts, "event enriched");
                self.queue.complete(job_id).await.map(|_| ())
            }
            Ok(JobOutcome::Skipped) => {
                tracing::info!(%job_id, %event_id, "event not found, job skipped");
                self.queue.skip(job_id, "event not found").await.map(|_| ())
            }
            Err(err) => {
                let retryable = err.is_retryable();
                let message = err.to_string();
                match self.queue.fail(job_id, &message, retryable).await {
                    Ok(JobState::Retrying) => {
                        tracing::warn!(%job_id, %event_id, attempt = record.attempts, error = %message, "enrichment attempt failed, will retry");
                        Ok(())
                    }
                    Ok(state) => {
                        tracing::error!(%job_id, %event_id, attempt = record.attempts, %state, error = %message, "enrichment failed");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        };

        if let Err(err) = reported {
            tracing::error!(%job_id, %event_id, error = %err, "could not record job result");
        }
    }

    /// Runs one attempt of `record`'s job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Mismatch`] when the job's type or noun differs
    /// from the stored event, [`JobError::Unresolved`] when a resolver
    /// failed (after writing whatever did resolve) or [`JobError::Store`]
    /// when the event store failed.
    pub async fn process(&self, record: &JobRecord) -> Result<JobOutcome, JobError> {
        let job = &record.job;
        let Some(event) = self.store.get_event(&job.event_id).await? else {
            return Ok(JobOutcome::Skipped);
        };
        if job.event_type() != event.event_type() {
            return Err(JobError::Mismatch(format!(
                "job type {} but event is {}",
                job.event_type(),
                event.event_type()
            )));
        }
        if job.noun_id != event.noun_id {
            return Err(JobError::Mismatch(format!(
                "job noun {} but event noun {}",
                job.noun_id, event.noun_id
            )));
        }

        let observed_at = event.observed_at();
        let mut update = Enrichment::default();
        let mut unresolved = Vec::new();

        match &event.kind {
            EventKind::Created { .. } => {}
            EventKind::Bid {
                bidder, value_wei, ..
            } => {
                let (name, price) = tokio::join!(
                    self.cache.resolve_name(bidder, event.block_number, observed_at),
                    self.cache.resolve_price(observed_at),
                );
                update.resolved_bidder_name = keep("bidder name", name, &mut unresolved);
                update.value_usd = keep("eth price", price, &mut unresolved)
                    .map(|usd| round_cents(value_wei.as_eth() * usd));
            }
            EventKind::Settled {
                winner, amount_wei, ..
            } => {
                let (name, price) = tokio::join!(
                    self.cache.resolve_name(winner, event.block_number, observed_at),
                    self.cache.resolve_price(observed_at),
                );
                update.resolved_winner_name = keep("winner name", name, &mut unresolved);
                update.amount_usd = keep("eth price", price, &mut unresolved)
                    .map(|usd| round_cents(amount_wei.as_eth() * usd));
            }
        }

        let mut merged = event.enrichment.clone();
        merged.merge(&update);
        update.headline = Some(build_headline(event.noun_id, &event.kind, &merged));
        update.processed_at = Some(self.clock.now());

        let mut rows = self.store.update_enrichment(&job.event_id, &update).await?;
        if rows == 0 {
            self.clock.sleep(self.config.write_retry_delay).await;
            rows = self.store.update_enrichment(&job.event_id, &update).await?;
            if rows == 0 {
                tracing::warn!(event_id = %job.event_id, "enrichment write affected no rows after retry");
            }
        }

        if unresolved.is_empty() {
            Ok(JobOutcome::Enriched { rows })
        } else {
            Err(JobError::Unresolved(unresolved))
        }
    }
}

/// Unwraps a resolution, recording failures in `unresolved`.
fn keep<T>(
    what: &str,
    result: Result<Option<T>, ResolveError>,
    unresolved: &mut Vec<String>,
) -> Option<T> {
    result.unwrap_or_else(|err| {
        unresolved.push(format!("{what}: {err}"));
        None
    })
}
