//! Enrichment job model: payload, identity, state machine and retry policy.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::QueueError;
use crate::domain::{EventId, EventIdError, EventKind, EventType};

/// Unique identifier for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a new random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work item for the enrichment worker.
///
/// Mirrors the event's identity and payload. The worker checks `kind` and
/// `noun_id` against the stored row and resolves from the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentJob {
    /// Target event; the idempotency key of the queue.
    pub event_id: EventId,
    /// Noun token id.
    pub noun_id: u64,
    /// Block number of the event.
    pub block_number: u64,
    /// Block timestamp in unix seconds.
    pub block_timestamp: i64,
    /// Variant payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EnrichmentJob {
    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Checks identity fields before the job is queued.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidJob`] naming the first missing or
    /// malformed field.
    pub fn validate(&self) -> Result<(), QueueError> {
        match self.event_id.as_str().parse::<EventId>() {
            Ok(_) => {}
            Err(EventIdError::Empty) => {
                return Err(QueueError::InvalidJob("eventId is required".to_string()));
            }
            Err(err) => return Err(QueueError::InvalidJob(err.to_string())),
        }
        if self.block_timestamp <= 0 {
            return Err(QueueError::InvalidJob(
                "blockTimestamp must be positive".to_string(),
            ));
        }
        match &self.kind {
            EventKind::Bid { bidder, .. } if bidder.trim().is_empty() => {
                Err(QueueError::InvalidJob("bidder is required".to_string()))
            }
            EventKind::Settled { winner, .. } if winner.trim().is_empty() => {
                Err(QueueError::InvalidJob("winner is required".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Lifecycle state of a job.
///
/// `queued → active → {completed | skipped | retrying → active | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// Held by a worker.
    Active,
    /// Failed, waiting for its backoff to elapse.
    Retrying,
    /// Finished successfully.
    Completed,
    /// Attempt ceiling reached or failure was not retryable.
    Failed,
    /// Target event did not exist.
    Skipped,
}

impl JobState {
    /// Returns `true` for states no worker will pick up again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A job and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Job id.
    pub job_id: JobId,
    /// Payload.
    pub job: EnrichmentJob,
    /// Current state.
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    /// Last failure or skip reason.
    pub last_error: Option<String>,
    /// Submission time.
    pub enqueued_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
    /// Earliest time the job may run again.
    pub run_at: DateTime<Utc>,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A new job was queued.
    Queued(JobRecord),
    /// A job for the same event already exists; nothing was queued.
    Duplicate(JobRecord),
}

impl SubmitOutcome {
    /// Returns the queued or pre-existing record.
    #[must_use]
    pub const fn record(&self) -> &JobRecord {
        match self {
            Self::Queued(record) | Self::Duplicate(record) => record,
        }
    }

    /// Returns `true` for [`SubmitOutcome::Duplicate`].
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Waiting for a worker.
    pub queued: usize,
    /// Held by a worker.
    pub active: usize,
    /// Backing off.
    pub retrying: usize,
    /// Done.
    pub completed: usize,
    /// Permanently failed.
    pub failed: usize,
    /// Skipped.
    pub skipped: usize,
}

impl QueueStats {
    pub(crate) fn count(&mut self, state: JobState) {
        let slot = match state {
            JobState::Queued => &mut self.queued,
            JobState::Active => &mut self.active,
            JobState::Retrying => &mut self.retrying,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Skipped => &mut self.skipped,
        };
        *slot += 1;
    }
}

/// Default attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Attempt ceiling and exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Returns `true` if a job that has made `attempts` attempts may run
    /// again.
    #[must_use]
    pub const fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt after `attempts` attempts:
    /// `base × 2^(attempts − 1)`.
    #[must_use]
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}
