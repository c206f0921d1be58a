//! Enrichment job queue and the worker pool that drains it.
//!
//! Submissions are keyed by event id: a second submission for the same
//! event is reported as a duplicate and never queued. Failed jobs back off
//! exponentially up to an attempt ceiling, then stay `failed` until an
//! operator requeues them.

pub mod job;
pub mod memory;
pub mod worker;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::EventId;

pub use job::{
    EnrichmentJob, JobId, JobRecord, JobState, QueueStats, RetryPolicy, SubmitOutcome,
};
pub use memory::{DEFAULT_RETENTION, InMemoryJobQueue};
pub use worker::{EnrichmentWorker, JobError, JobOutcome, WorkerConfig};

/// Queue operation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The job is missing identity fields.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// No job with this id.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// No job for this event.
    #[error("no job for event: {0}")]
    EventNotFound(EventId),

    /// The job is not in a state that allows the operation.
    #[error("job {job_id} is {state}")]
    InvalidState {
        /// Job id.
        job_id: JobId,
        /// Current state.
        state: JobState,
    },

    /// Internal lock poisoned.
    #[error("job queue state poisoned")]
    Poisoned,
}

/// Durable, retryable work queue for enrichment jobs.
#[async_trait]
pub trait JobQueue: Send + Sync + Debug {
    /// Queues `job` unless a job for the same event exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidJob`] if identity fields are missing.
    async fn submit(&self, job: EnrichmentJob) -> Result<SubmitOutcome, QueueError>;

    /// Waits for the next runnable job and marks it active.
    ///
    /// Cancel safe: dropping the future before it resolves claims nothing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if queue state is unusable.
    async fn next(&self) -> Result<JobRecord, QueueError>;

    /// Marks an active job completed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::JobNotFound`] or [`QueueError::InvalidState`] if
    /// the job is unknown or not active.
    async fn complete(&self, job_id: JobId) -> Result<JobRecord, QueueError>;

    /// Marks an active job skipped.
    ///
    /// # Errors
    ///
    /// As [`JobQueue::complete`].
    async fn skip(&self, job_id: JobId, reason: &str) -> Result<JobRecord, QueueError>;

    /// Records a failed attempt and returns the resulting state:
    /// `retrying` if `retryable` and attempts remain, `failed` otherwise.
    ///
    /// # Errors
    ///
    /// As [`JobQueue::complete`].
    async fn fail(&self, job_id: JobId, error: &str, retryable: bool)
    -> Result<JobState, QueueError>;

    /// Looks up a job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if queue state is unusable.
    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, QueueError>;

    /// Looks up the job for an event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if queue state is unusable.
    async fn get_by_event(&self, event_id: &EventId) -> Result<Option<JobRecord>, QueueError>;

    /// Lists permanently failed jobs, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if queue state is unusable.
    async fn failed_jobs(&self) -> Result<Vec<JobRecord>, QueueError>;

    /// Requeues the failed job for `event_id` with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EventNotFound`] if no job exists for the event
    /// and [`QueueError::InvalidState`] if it has not failed.
    async fn retry_failed(&self, event_id: &EventId) -> Result<JobRecord, QueueError>;

    /// Counts jobs by state.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if queue state is unusable.
    async fn stats(&self) -> Result<QueueStats, QueueError>;
}
