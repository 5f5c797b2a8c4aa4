//! Queued job records and enqueue options.

use chrono::{DateTime, Utc};
use herald_core::JobPayload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = Uuid;

/// Retry backoff flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles with each attempt.
    Exponential,
}

/// Retry backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Backoff flavor.
    pub kind: BackoffKind,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
}

impl BackoffPolicy {
    /// Fixed delay before every retry.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay_ms,
        }
    }

    /// Exponentially growing delay.
    pub fn exponential(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay_ms,
        }
    }

    /// Delay before the next retry after `attempts` tries.
    pub fn delay_after(&self, attempts: u32) -> chrono::Duration {
        let millis = match self.kind {
            BackoffKind::Fixed => self.delay_ms,
            BackoffKind::Exponential => self
                .delay_ms
                .saturating_mul(2u64.saturating_pow(attempts.saturating_sub(1))),
        };
        chrono::Duration::milliseconds(millis.min(3_600_000) as i64)
    }
}

/// Options applied when a job is enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Initial delay before the job becomes claimable, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Total execution attempts before the job is dead.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Backoff between execution attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffPolicy>,
    /// Delete the job record once completed.
    #[serde(default = "default_true")]
    pub remove_on_complete: bool,
    /// Delete the job record once dead.
    #[serde(default)]
    pub remove_on_fail: bool,
}

fn default_attempts() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay_ms: None,
            attempts: default_attempts(),
            backoff: None,
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

impl JobOptions {
    /// Set the initial delay.
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Set the attempt budget.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the retry backoff.
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Keep the job record after completion.
    pub fn keep_on_complete(mut self) -> Self {
        self.remove_on_complete = false;
        self
    }

    /// Delete the job record when it dies.
    pub fn remove_on_fail(mut self) -> Self {
        self.remove_on_fail = true;
        self
    }
}

/// Job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed.
    Waiting,
    /// Scheduled for later (initial delay or retry backoff).
    Delayed,
    /// Claimed by a worker.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed, will be retried.
    Failed,
    /// Failed permanently (attempt budget exhausted).
    Dead,
}

/// A job persisted in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Job name under the queue.
    pub name: String,
    /// The fan-out payload.
    pub payload: JobPayload,
    /// Current state.
    pub state: JobState,
    /// Execution attempts so far.
    pub attempts: u32,
    /// Total attempt budget.
    pub max_attempts: u32,
    /// Retry backoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffPolicy>,
    /// Delete the record once completed.
    pub remove_on_complete: bool,
    /// Delete the record once dead.
    pub remove_on_fail: bool,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job becomes claimable (delayed jobs and retries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the current attempt started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueuedJob {
    /// Create a job from a payload and options.
    pub fn new(name: impl Into<String>, payload: JobPayload, options: &JobOptions) -> Self {
        let now = Utc::now();
        let scheduled_at = options
            .delay_ms
            .map(|ms| now + chrono::Duration::milliseconds(ms as i64));

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            state: if scheduled_at.is_some() {
                JobState::Delayed
            } else {
                JobState::Waiting
            },
            attempts: 0,
            max_attempts: options.attempts.max(1),
            backoff: options.backoff,
            remove_on_complete: options.remove_on_complete,
            remove_on_fail: options.remove_on_fail,
            created_at: now,
            scheduled_at,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Whether the job is past its scheduled time.
    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Whether another execution attempt remains.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Mark the job claimed.
    pub fn start_processing(&mut self) {
        self.state = JobState::Active;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    /// Mark the job completed.
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the attempt failed.
    ///
    /// Schedules a retry while the attempt budget lasts, dead otherwise.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        if self.can_retry() {
            self.state = JobState::Failed;
            self.scheduled_at = Some(Utc::now() + self.retry_delay());
        } else {
            self.state = JobState::Dead;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Delay before the next retry.
    pub fn retry_delay(&self) -> chrono::Duration {
        self.backoff
            .map(|b| b.delay_after(self.attempts))
            .unwrap_or_else(chrono::Duration::zero)
    }
}
