//! In-memory job queue.
//!
//! ## Limitations
//!
//! - **Single-process only**: jobs are not visible across process boundaries
//! - **No persistence**: queued and failed jobs are lost on restart
//! - **Bounded history**: only the most recent [`DEFAULT_RETENTION`]
//!   completed or skipped records are kept (see
//!   [`InMemoryJobQueue::with_retention`]). Once a record is evicted, a new
//!   submission for its event is queued again. Failed records stay until an
//!   operator retries them.
//!
//! Backoff timing goes through the injected [`Clock`], so tests driving a
//! manual clock see retries become due without real sleeps.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::{
    EnrichmentJob, JobId, JobQueue, JobRecord, JobState, QueueError, QueueStats, RetryPolicy,
    SubmitOutcome,
};
use crate::domain::{Clock, EventId};

/// Default number of completed or skipped records kept for lookups and
/// duplicate detection.
pub const DEFAULT_RETENTION: usize = 10_000;

#[derive(Debug)]
struct QueueState {
    jobs: HashMap<JobId, JobRecord>,
    by_event: HashMap<EventId, JobId>,
    ready: VecDeque<JobId>,
    delayed: BTreeSet<(DateTime<Utc>, JobId)>,
    finished: VecDeque<JobId>,
    retention: usize,
}

impl QueueState {
    fn record_mut(&mut self, job_id: JobId) -> Result<&mut JobRecord, QueueError> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))
    }

    fn active_mut(&mut self, job_id: JobId) -> Result<&mut JobRecord, QueueError> {
        let record = self.record_mut(job_id)?;
        if record.state != JobState::Active {
            return Err(QueueError::InvalidState {
                job_id,
                state: record.state,
            });
        }
        Ok(record)
    }

    /// Claims whichever has waited longer: the head of the ready queue or
    /// the earliest retry that is already due.
    fn claim(&mut self, now: DateTime<Utc>) -> Option<JobRecord> {
        let ready_since = self
            .ready
            .front()
            .map(|job_id| self.jobs.get(job_id).map_or(now, |record| record.run_at));
        let due = self.delayed.first().copied().filter(|(due, _)| *due <= now);

        let job_id = match (ready_since, due) {
            (Some(since), Some((due, job_id))) if due < since => {
                self.delayed.remove(&(due, job_id));
                job_id
            }
            (Some(_), _) => self.ready.pop_front()?,
            (None, Some((due, job_id))) => {
                self.delayed.remove(&(due, job_id));
                job_id
            }
            (None, None) => return None,
        };
        let record = self.jobs.get_mut(&job_id)?;
        record.state = JobState::Active;
        record.attempts += 1;
        record.updated_at = now;
        Some(record.clone())
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.delayed.first().map(|(due, _)| *due)
    }

    /// Records a completed or skipped job, evicting the oldest beyond the
    /// retention limit.
    fn finish(&mut self, job_id: JobId) {
        self.finished.push_back(job_id);
        while self.finished.len() > self.retention {
            let Some(evicted) = self.finished.pop_front() else {
                break;
            };
            if let Some(record) = self.jobs.remove(&evicted) {
                if self.by_event.get(&record.job.event_id) == Some(&evicted) {
                    self.by_event.remove(&record.job.event_id);
                }
            }
        }
    }
}

/// Job queue held in process memory.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

fn poisoned<T>(_: PoisonError<T>) -> QueueError {
    QueueError::Poisoned
}

impl InMemoryJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                by_event: HashMap::new(),
                ready: VecDeque::new(),
                delayed: BTreeSet::new(),
                finished: VecDeque::new(),
                retention: DEFAULT_RETENTION,
            }),
            notify: Notify::new(),
            clock,
            policy,
        }
    }

    /// Keeps at most `retention` completed or skipped records.
    #[must_use]
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .retention = retention;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(poisoned)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn submit(&self, job: EnrichmentJob) -> Result<SubmitOutcome, QueueError> {
        job.validate()?;
        let now = self.clock.now();

        let mut state = self.lock()?;
        if let Some(existing) = state
            .by_event
            .get(&job.event_id)
            .and_then(|job_id| state.jobs.get(job_id))
        {
            tracing::debug!(event_id = %job.event_id, job_id = %existing.job_id, "duplicate submission");
            return Ok(SubmitOutcome::Duplicate(existing.clone()));
        }

        let record = JobRecord {
            job_id: JobId::new(),
            job,
            state: JobState::Queued,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
            run_at: now,
        };
        state
            .by_event
            .insert(record.job.event_id.clone(), record.job_id);
        state.jobs.insert(record.job_id, record.clone());
        state.ready.push_back(record.job_id);
        drop(state);

        self.notify.notify_waiters();
        tracing::info!(job_id = %record.job_id, event_id = %record.job.event_id, "job queued");
        Ok(SubmitOutcome::Queued(record))
    }

    async fn next(&self) -> Result<JobRecord, QueueError> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            let now = self.clock.now();
            let next_due = {
                let mut state = self.lock()?;
                if let Some(record) = state.claim(now) {
                    return Ok(record);
                }
                state.next_due()
            };

            match next_due {
                Some(due) => {
                    let wait = (due - now).to_std().unwrap_or_default();
                    tokio::select! {
                        () = &mut notified => {}
                        () = self.clock.sleep(wait) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn complete(&self, job_id: JobId) -> Result<JobRecord, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let record = state.active_mut(job_id)?;
        record.state = JobState::Completed;
        record.updated_at = now;
        let record = record.clone();
        state.finish(job_id);
        Ok(record)
    }

    async fn skip(&self, job_id: JobId, reason: &str) -> Result<JobRecord, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let record = state.active_mut(job_id)?;
        record.state = JobState::Skipped;
        record.last_error = Some(reason.to_string());
        record.updated_at = now;
        let record = record.clone();
        state.finish(job_id);
        Ok(record)
    }

    async fn fail(
        &self,
        job_id: JobId,
        error: &str,
        retryable: bool,
    ) -> Result<JobState, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let record = state.active_mut(job_id)?;
        record.last_error = Some(error.to_string());
        record.updated_at = now;

        if retryable && self.policy.allows_retry(record.attempts) {
            let delay = self.policy.delay_after(record.attempts);
            let due = now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            record.state = JobState::Retrying;
            record.run_at = due;
            state.delayed.insert((due, job_id));
            drop(state);
            self.notify.notify_waiters();
            return Ok(JobState::Retrying);
        }

        record.state = JobState::Failed;
        Ok(JobState::Failed)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.lock()?.jobs.get(&job_id).cloned())
    }

    async fn get_by_event(&self, event_id: &EventId) -> Result<Option<JobRecord>, QueueError> {
        let state = self.lock()?;
        Ok(state
            .by_event
            .get(event_id)
            .and_then(|job_id| state.jobs.get(job_id))
            .cloned())
    }

    async fn failed_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        let state = self.lock()?;
        let mut failed: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|record| record.state == JobState::Failed)
            .cloned()
            .collect();
        failed.sort_by_key(|record| record.updated_at);
        Ok(failed)
    }

    async fn retry_failed(&self, event_id: &EventId) -> Result<JobRecord, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let job_id = *state
            .by_event
            .get(event_id)
            .ok_or_else(|| QueueError::EventNotFound(event_id.clone()))?;
        let record = state.record_mut(job_id)?;
        if record.state != JobState::Failed {
            return Err(QueueError::InvalidState {
                job_id,
                state: record.state,
            });
        }
        record.state = JobState::Queued;
        record.attempts = 0;
        record.run_at = now;
        record.updated_at = now;
        let record = record.clone();
        state.ready.push_back(job_id);
        drop(state);

        self.notify.notify_waiters();
        tracing::info!(job_id = %job_id, event_id = %event_id, "failed job requeued");
        Ok(record)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let state = self.lock()?;
        let mut stats = QueueStats::default();
        for record in state.jobs.values() {
            stats.count(record.state);
        }
        Ok(stats)
    }
}
