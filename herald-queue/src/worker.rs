//! Worker runtime: claim jobs, dispatch to channel adapters, track
//! outcomes.

use async_trait::async_trait;
use futures::FutureExt;
use herald_channels::ChannelRegistry;
use herald_core::{StatsHash, DEFAULT_TRACKING_KEY};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{cancel, stats, JobQueue, QueueConfig, QueuedJob, Result, StoreConnection};

/// Worker lifecycle hooks.
///
/// All methods default to no-ops so callers override only what they need.
/// Callbacks run on the worker's executor and should be short; a panic
/// inside one is caught and logged, never propagated.
#[async_trait]
pub trait WorkerEvents: Send + Sync {
    /// A job was claimed and is about to be processed.
    async fn on_start(&self, _job: &QueuedJob) {}

    /// A job completed; `stats` is the current counter hash for the job's
    /// tracking key.
    async fn on_complete(&self, _job: &QueuedJob, _stats: &StatsHash) {}

    /// The queue was observed empty after having had work.
    async fn on_drained(&self) {}
}

/// Default no-op lifecycle hooks.
pub struct NoopEvents;

#[async_trait]
impl WorkerEvents for NoopEvents {}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume.
    pub queue_name: String,
    /// Maximum in-flight jobs.
    pub concurrency: usize,
    /// Tracking key used when a job payload does not carry one.
    pub tracking_key: String,
    /// Delete the tracking key after the completion callback runs.
    pub reset_stats_after_completion: bool,
    /// Claim lock duration.
    pub lock_duration: Duration,
    /// Idle poll interval.
    pub poll_interval: Duration,
    /// Drain detection poll budget.
    pub drain_poll_attempts: u32,
    /// Drain detection poll spacing.
    pub drain_poll_interval: Duration,
}

impl WorkerConfig {
    /// Create a configuration for a queue.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            concurrency: 10,
            tracking_key: DEFAULT_TRACKING_KEY.to_string(),
            reset_stats_after_completion: false,
            lock_duration: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            drain_poll_attempts: 10,
            drain_poll_interval: Duration::from_millis(1500),
        }
    }

    /// Set the maximum in-flight jobs.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the fallback tracking key.
    pub fn tracking_key(mut self, key: impl Into<String>) -> Self {
        self.tracking_key = key.into();
        self
    }

    /// Delete the tracking key after each completion callback.
    pub fn reset_stats_after_completion(mut self) -> Self {
        self.reset_stats_after_completion = true;
        self
    }

    /// Set the claim lock duration.
    pub fn lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    /// Set the idle poll interval.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

struct WorkerShared {
    queue: JobQueue,
    store: herald_redis::Store,
    registry: Arc<ChannelRegistry>,
    events: Arc<dyn WorkerEvents>,
    config: WorkerConfig,
    had_work: AtomicBool,
    draining: AtomicBool,
}

/// Worker manager: starts claim loops over a queue and returns a handle
/// for cooperative shutdown.
pub struct WorkerManager;

impl WorkerManager {
    /// Start consuming jobs.
    ///
    /// Spawns `concurrency` claim loops sharing one queue client. The
    /// returned handle stops intake and drains in-flight jobs on
    /// [`close`](WorkerHandle::close).
    pub async fn start(
        connection: StoreConnection,
        config: WorkerConfig,
        registry: Arc<ChannelRegistry>,
        events: Arc<dyn WorkerEvents>,
    ) -> Result<WorkerHandle> {
        if config.queue_name.trim().is_empty() {
            return Err(crate::QueueError::Config(
                "queue_name is required".to_string(),
            ));
        }

        let (store, store_owned) = connection.resolve().await?;
        let queue_config =
            QueueConfig::new(&config.queue_name).with_lock_duration(config.lock_duration);
        let queue = JobQueue::with_config(store.clone(), queue_config);

        info!(
            component = "worker",
            queue = %config.queue_name,
            concurrency = config.concurrency,
            "worker starting"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(WorkerShared {
            queue: queue.clone(),
            store,
            registry,
            events,
            config,
            had_work: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(shared.config.concurrency);
        for slot in 0..shared.config.concurrency {
            let shared = shared.clone();
            let mut shutdown = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                claim_loop(shared, &mut shutdown, slot).await;
            }));
        }

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            handles,
            queue,
            store_owned,
        })
    }
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    queue: JobQueue,
    store_owned: bool,
}

impl WorkerHandle {
    /// Stop claiming, await in-flight jobs, release the queue client and
    /// any worker-owned store handle.
    pub async fn close(mut self) {
        info!(component = "worker", queue = %self.queue.config().queue_name, "worker closing");
        let _ = self.shutdown.send(true);
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        // queue client (and the store handle, when worker-owned) drop here
        info!(
            component = "worker",
            queue = %self.queue.config().queue_name,
            store_owned = self.store_owned,
            "worker closed"
        );
    }

    /// Current queue depth.
    pub async fn job_counts(&self) -> Result<crate::JobCounts> {
        self.queue.job_counts().await
    }
}

async fn claim_loop(shared: Arc<WorkerShared>, shutdown: &mut watch::Receiver<bool>, slot: usize) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match shared.queue.claim().await {
            Ok(Some(mut job)) => {
                shared.had_work.store(true, Ordering::SeqCst);
                process_job(&shared, &mut job).await;
            }
            Ok(None) => {
                if shared.had_work.swap(false, Ordering::SeqCst) {
                    check_drained(&shared).await;
                }
                idle(shutdown, shared.config.poll_interval).await;
            }
            Err(e) => {
                error!(component = "worker", slot, error = %e, "failed to claim job");
                idle(shutdown, shared.config.poll_interval).await;
            }
        }
    }
}

async fn idle(shutdown: &mut watch::Receiver<bool>, interval: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = shutdown.changed() => {}
    }
}

/// Run one claimed job through the processing protocol.
async fn process_job(shared: &Arc<WorkerShared>, job: &mut QueuedJob) {
    let span = info_span!(
        "job",
        component = "worker",
        job_id = %job.id,
        job_name = %job.name,
        campaign_id = job.payload.campaign_id.as_deref().unwrap_or(""),
        channel = %job.payload.channel,
    );

    async {
        guard_callback("on_start", shared.events.on_start(job)).await;

        if let Some(campaign_id) = job.payload.campaign_id.clone()
            && cancel::is_cancelled(&shared.store, &campaign_id).await
        {
            info!(component = "worker", "campaign cancelled, skipping job");
            if let Err(e) = shared.queue.complete(job).await {
                error!(component = "worker", error = %e, "failed to complete skipped job");
            }
            return;
        }

        let tracking_key = effective_tracking_key(job, &shared.config).to_string();

        if let Err(e) = job.payload.validate() {
            fail_job(shared, job, &tracking_key, &e.to_string()).await;
            return;
        }

        let adapter = match shared.registry.get(job.payload.channel) {
            Ok(adapter) => adapter,
            Err(e) => {
                fail_job(shared, job, &tracking_key, &e.to_string()).await;
                return;
            }
        };

        let outcomes = adapter.send(&job.payload.user_ids, &job.payload.meta).await;

        if job.payload.track_responses {
            stats::record_outcomes(&shared.store, &tracking_key, &outcomes).await;
        }

        if let Err(e) = shared.queue.complete(job).await {
            error!(component = "worker", error = %e, "failed to complete job");
            return;
        }

        let stats_hash = stats::get_stats(&shared.store, &tracking_key).await;
        guard_callback("on_complete", shared.events.on_complete(job, &stats_hash)).await;
        if shared.config.reset_stats_after_completion {
            stats::reset_stats(&shared.store, &tracking_key).await;
        }

        info!(
            component = "worker",
            recipients = outcomes.len(),
            success = outcomes.iter().filter(|o| o.is_success()).count(),
            "job processed"
        );
    }
    .instrument(span)
    .await
}

/// Record the failure counter when tracking, then fail the job so the
/// queue's retry policy can take over.
async fn fail_job(shared: &Arc<WorkerShared>, job: &mut QueuedJob, tracking_key: &str, error: &str) {
    warn!(component = "worker", error, "job failed");

    if job.payload.track_responses {
        stats::record_error(&shared.store, tracking_key, error).await;
    }

    if let Err(e) = shared.queue.fail(job, error).await {
        error!(component = "worker", error = %e, "failed to record job failure");
    }
}

/// Confirm the queue is really empty, then fire `on_drained`.
async fn check_drained(shared: &Arc<WorkerShared>) {
    if shared
        .draining
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    for attempt in 0..shared.config.drain_poll_attempts {
        match shared.queue.job_counts().await {
            Ok(counts) if counts.total() == 0 => {
                info!(component = "worker", "queue drained");
                guard_callback("on_drained", shared.events.on_drained()).await;
                shared.draining.store(false, Ordering::SeqCst);
                return;
            }
            Ok(counts) => {
                tracing::debug!(
                    component = "worker",
                    attempt,
                    remaining = counts.total(),
                    "queue not yet empty"
                );
            }
            Err(e) => {
                warn!(component = "worker", error = %e, "drain check failed to read counts");
            }
        }
        tokio::time::sleep(shared.config.drain_poll_interval).await;
    }

    warn!(
        component = "worker",
        "queue never observed empty, skipping drained callback"
    );
    shared.draining.store(false, Ordering::SeqCst);
}

fn effective_tracking_key<'a>(job: &'a QueuedJob, config: &'a WorkerConfig) -> &'a str {
    if job.payload.tracking_key.is_empty() {
        &config.tracking_key
    } else {
        &job.payload.tracking_key
    }
}

async fn guard_callback<F>(name: &str, callback: F)
where
    F: Future<Output = ()>,
{
    if AssertUnwindSafe(callback).catch_unwind().await.is_err() {
        error!(
            component = "worker",
            callback = name,
            "lifecycle callback panicked"
        );
    }
}
