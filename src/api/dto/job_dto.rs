//! Enrichment job DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::queue::{JobRecord, QueueStats};

/// Response body of `POST /jobs/enrichment`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    /// Job id (new, or the existing job's id for a duplicate).
    pub job_id: String,
    /// Target event.
    pub event_id: String,
    /// Current job state.
    pub state: String,
    /// `true` if a job for the event already existed.
    pub duplicate: bool,
}

impl SubmitJobResponse {
    /// Builds the response from a job record.
    #[must_use]
    pub fn new(record: &JobRecord, duplicate: bool) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            event_id: record.job.event_id.to_string(),
            state: record.state.to_string(),
            duplicate,
        }
    }
}

/// A job as shown to operators.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    /// Job id.
    pub job_id: String,
    /// Target event.
    pub event_id: String,
    /// Event type.
    pub event_type: String,
    /// Current state.
    pub state: String,
    /// Attempts started.
    pub attempts: u32,
    /// Last failure or skip reason.
    pub last_error: Option<String>,
    /// Submission time.
    pub enqueued_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl From<JobRecord> for JobDto {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id.to_string(),
            event_type: record.job.event_type().to_string(),
            event_id: record.job.event_id.to_string(),
            state: record.state.to_string(),
            attempts: record.attempts,
            last_error: record.last_error,
            enqueued_at: record.enqueued_at,
            updated_at: record.updated_at,
        }
    }
}

/// Job counts by state.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
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
    /// Target event missing.
    pub skipped: usize,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(stats: QueueStats) -> Self {
        Self {
            queued: stats.queued,
            active: stats.active,
            retrying: stats.retrying,
            completed: stats.completed,
            failed: stats.failed,
            skipped: stats.skipped,
        }
    }
}
