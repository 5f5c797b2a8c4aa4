//! Durable job queue over the shared store.

use chrono::Utc;
use herald_core::JobPayload;
use herald_redis::Store;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{JobCodec, JobId, JobOptions, JobState, QueueError, QueuedJob, Result};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name.
    pub queue_name: String,
    /// Key prefix for store keys.
    pub key_prefix: String,
    /// How long a claimed job stays locked before it is considered
    /// abandoned and requeued.
    pub lock_duration: Duration,
    /// Retention of persisted job records.
    pub retention: Duration,
}

impl QueueConfig {
    /// Create a configuration for a named queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            key_prefix: format!("herald:queue:{}", queue_name),
            queue_name,
            lock_duration: Duration::from_secs(30),
            retention: Duration::from_secs(86400),
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the claim lock duration.
    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    /// Set the job record retention.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Build a store key.
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }
}

/// Snapshot of queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobCounts {
    /// Jobs currently claimed by workers.
    pub active: u64,
    /// Jobs ready to be claimed.
    pub waiting: u64,
    /// Jobs waiting out a delay or retry backoff.
    pub delayed: u64,
}

impl JobCounts {
    /// Total jobs not yet settled.
    pub fn total(&self) -> u64 {
        self.active + self.waiting + self.delayed
    }
}

/// Durable job queue backed by the shared store.
///
/// Waiting jobs form a FIFO list ordered by a monotonic sequence; delayed
/// jobs and retries live in a schedule set and are promoted when due.
/// A claim moves the job into an active set scored by lock expiry, so a
/// crashed worker's jobs return to the waiting list once their lock runs
/// out.
#[derive(Clone)]
pub struct JobQueue {
    store: Store,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a queue with default configuration.
    pub fn new(store: Store, queue_name: impl Into<String>) -> Self {
        Self::with_config(store, QueueConfig::new(queue_name))
    }

    /// Create a queue with custom configuration.
    pub fn with_config(store: Store, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a job.
    ///
    /// The payload is validated before anything is written; a structurally
    /// invalid payload never reaches the store.
    pub async fn add(
        &self,
        job_name: impl Into<String>,
        payload: JobPayload,
        options: &JobOptions,
    ) -> Result<JobId> {
        payload.validate()?;

        let job = QueuedJob::new(job_name, payload, options);
        let job_id = job.id;

        self.save_job(&job).await?;

        if job.state == JobState::Delayed {
            let ready_at = job
                .scheduled_at
                .map(|at| at.timestamp_millis())
                .unwrap_or_else(|| Utc::now().timestamp_millis());
            self.store
                .zadd(&self.config.key("delayed"), &job_id.to_string(), ready_at as f64)
                .await?;
        } else {
            self.push_waiting(job_id).await?;
        }

        debug!(
            component = "queue",
            queue = %self.config.queue_name,
            job_id = %job_id,
            job_name = %job.name,
            recipients = job.payload.len(),
            "job enqueued"
        );

        Ok(job_id)
    }

    /// Claim the next ready job.
    ///
    /// Promotes due delayed jobs and requeues lock-expired jobs first.
    pub async fn claim(&self) -> Result<Option<QueuedJob>> {
        self.promote_delayed().await?;
        self.requeue_expired().await?;

        let Some(id_str) = self.store.zpopmin(&self.config.key("wait")).await? else {
            return Ok(None);
        };

        let Ok(job_id) = id_str.parse::<JobId>() else {
            warn!(component = "queue", member = %id_str, "dropping unparseable waiting entry");
            return Ok(None);
        };

        let Some(mut job) = self.get_job(job_id).await? else {
            // record expired out from under the waiting list
            return Ok(None);
        };

        job.start_processing();
        self.save_job(&job).await?;

        let lock_expires =
            Utc::now().timestamp_millis() + self.config.lock_duration.as_millis() as i64;
        self.store
            .zadd(&self.config.key("active"), &id_str, lock_expires as f64)
            .await?;

        Ok(Some(job))
    }

    /// Complete a claimed job.
    pub async fn complete(&self, job: &mut QueuedJob) -> Result<()> {
        self.store
            .zrem(&self.config.key("active"), &job.id.to_string())
            .await?;

        job.complete();
        if job.remove_on_complete {
            self.store.delete(&self.job_key(job.id)).await?;
        } else {
            self.save_job(job).await?;
        }
        Ok(())
    }

    /// Fail a claimed job.
    ///
    /// While the attempt budget lasts the job is rescheduled with its
    /// backoff; afterwards it lands in the dead set, retained for
    /// inspection unless `remove_on_fail` is set.
    pub async fn fail(&self, job: &mut QueuedJob, error: &str) -> Result<()> {
        let id_str = job.id.to_string();
        self.store.zrem(&self.config.key("active"), &id_str).await?;

        job.fail(error);
        match job.state {
            JobState::Failed => {
                let ready_at = job
                    .scheduled_at
                    .map(|at| at.timestamp_millis())
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                self.save_job(job).await?;
                self.store
                    .zadd(&self.config.key("delayed"), &id_str, ready_at as f64)
                    .await?;
            }
            _ => {
                if job.remove_on_fail {
                    self.store.delete(&self.job_key(job.id)).await?;
                } else {
                    self.save_job(job).await?;
                    self.store
                        .zadd(
                            &self.config.key("dead"),
                            &id_str,
                            Utc::now().timestamp_millis() as f64,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Current queue depth.
    pub async fn job_counts(&self) -> Result<JobCounts> {
        Ok(JobCounts {
            active: self.store.zcard(&self.config.key("active")).await?,
            waiting: self.store.zcard(&self.config.key("wait")).await?,
            delayed: self.store.zcard(&self.config.key("delayed")).await?,
        })
    }

    /// Load a job record.
    pub async fn get_job(&self, job_id: JobId) -> Result<Option<QueuedJob>> {
        match self.store.get(&self.job_key(job_id)).await? {
            Some(raw) => Ok(Some(JobCodec::decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Move due delayed jobs to the waiting list.
    pub async fn promote_delayed(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis() as f64;
        let due = self
            .store
            .zrangebyscore_upto(&self.config.key("delayed"), now)
            .await?;

        for id_str in due {
            if !self.store.zrem(&self.config.key("delayed"), &id_str).await? {
                // another claimer promoted it first
                continue;
            }
            if let Ok(job_id) = id_str.parse::<JobId>() {
                self.push_waiting(job_id).await?;
            }
        }
        Ok(())
    }

    /// Return lock-expired active jobs to the waiting list.
    pub async fn requeue_expired(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis() as f64;
        let expired = self
            .store
            .zrangebyscore_upto(&self.config.key("active"), now)
            .await?;

        for id_str in expired {
            if !self.store.zrem(&self.config.key("active"), &id_str).await? {
                continue;
            }
            let Ok(job_id) = id_str.parse::<JobId>() else {
                continue;
            };
            warn!(
                component = "queue",
                queue = %self.config.queue_name,
                job_id = %id_str,
                "claim lock expired, requeueing job"
            );
            if let Some(mut job) = self.get_job(job_id).await? {
                job.state = JobState::Waiting;
                self.save_job(&job).await?;
                self.push_waiting(job_id).await?;
            }
        }
        Ok(())
    }

    /// Remove the queue's bookkeeping sets.
    ///
    /// Job records are left to expire through their retention TTL.
    pub async fn clear(&self) -> Result<()> {
        for suffix in ["wait", "delayed", "active", "dead", "seq"] {
            self.store.delete(&self.config.key(suffix)).await?;
        }
        Ok(())
    }

    fn job_key(&self, job_id: JobId) -> String {
        self.config.key(&format!("job:{}", job_id))
    }

    async fn save_job(&self, job: &QueuedJob) -> Result<()> {
        let encoded = JobCodec::encode(job)?;
        self.store
            .set_ex(&self.job_key(job.id), &encoded, self.config.retention)
            .await?;
        Ok(())
    }

    /// Append to the FIFO waiting list.
    async fn push_waiting(&self, job_id: JobId) -> Result<()> {
        let seq = self.store.incr(&self.config.key("seq"), 1).await?;
        self.store
            .zadd(&self.config.key("wait"), &job_id.to_string(), seq as f64)
            .await?;
        Ok(())
    }
}
