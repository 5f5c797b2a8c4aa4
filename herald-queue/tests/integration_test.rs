//! Integration tests for herald-queue

use herald_core::{ChannelKind, JobPayload, MessageMeta, SendOutcome, TelegramMeta};
use herald_queue::*;
use std::time::Duration;

fn telegram_payload(n: usize) -> JobPayload {
    let mut payload = JobPayload::new(ChannelKind::Telegram);
    for i in 0..n {
        payload = payload.recipient(
            format!("chat-{}", i),
            MessageMeta::Telegram(TelegramMeta::text(format!("m{}", i))),
        );
    }
    payload
}

#[test]
fn test_queue_config_creation() {
    let config = QueueConfig::new("notifications");
    assert_eq!(config.queue_name, "notifications");
    assert!(config.key_prefix.contains("notifications"));
}

#[test]
fn test_queue_config_builder() {
    let config = QueueConfig::new("notifications")
        .with_lock_duration(Duration::from_secs(45))
        .with_retention(Duration::from_secs(7200));

    assert_eq!(config.lock_duration, Duration::from_secs(45));
    assert_eq!(config.retention, Duration::from_secs(7200));
}

#[test]
fn test_job_options_merge_defaults() {
    let options = JobOptions::default();
    assert!(options.remove_on_complete);
    assert!(!options.remove_on_fail);
    assert_eq!(options.attempts, 1);
}

#[test]
fn test_job_creation_from_payload() {
    let job = QueuedJob::new("notify", telegram_payload(3), &JobOptions::default());

    assert_eq!(job.name, "notify");
    assert_eq!(job.payload.len(), 3);
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.attempts, 0);
}

#[test]
fn test_job_with_backoff() {
    let options = JobOptions::default()
        .attempts(5)
        .backoff(BackoffPolicy::exponential(250));
    let job = QueuedJob::new("notify", telegram_payload(1), &options);

    assert_eq!(job.max_attempts, 5);
    assert_eq!(job.backoff, Some(BackoffPolicy::exponential(250)));
}

#[test]
fn test_codec_round_trip() {
    let job = QueuedJob::new("notify", telegram_payload(2), &JobOptions::default());
    let decoded = JobCodec::decode(&JobCodec::encode(&job).unwrap()).unwrap();

    assert_eq!(decoded.id, job.id);
    assert_eq!(decoded.payload.user_ids, job.payload.user_ids);
}

#[test]
fn test_queue_error_display() {
    let err = QueueError::InvalidJob("userIds is empty".to_string());
    assert!(err.to_string().contains("userIds is empty"));
}

#[test]
fn test_cancellation_key_format() {
    assert_eq!(
        cancel::cancellation_key("c1"),
        "worker:cancel:campaign:c1"
    );
}

// The tests below require Redis running on localhost:6379.
// Run with: cargo test -- --ignored

mod with_redis {
    use super::*;
    use async_trait::async_trait;
    use herald_channels::{ChannelAdapter, ChannelRegistry};
    use herald_redis::{RedisConfig, Store};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Adapter that records how many recipients it was asked to send to.
    struct CountingAdapter {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl ChannelAdapter for CountingAdapter {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Telegram
        }

        async fn send(&self, recipients: &[String], _metas: &[MessageMeta]) -> Vec<SendOutcome> {
            self.sends.fetch_add(recipients.len(), Ordering::SeqCst);
            recipients
                .iter()
                .map(|r| SendOutcome::success(r, serde_json::json!({"message_id": 1})))
                .collect()
        }
    }

    async fn store() -> Store {
        Store::connect(RedisConfig::default()).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_worker_processes_job_and_tracks_stats() {
        let store = store().await;
        let queue = JobQueue::new(store.clone(), "herald-e2e-process");
        queue.clear().await.unwrap();
        stats::reset_stats(&store, "herald-e2e-process:stats").await;

        let adapter = Arc::new(CountingAdapter {
            sends: AtomicUsize::new(0),
        });
        let registry = Arc::new(ChannelRegistry::new());
        registry.register(adapter.clone());

        let mut payload = telegram_payload(2);
        payload.track_responses = true;
        payload.tracking_key = "herald-e2e-process:stats".to_string();
        queue
            .add("notify", payload, &JobOptions::default())
            .await
            .unwrap();

        let handle = WorkerManager::start(
            StoreConnection::Handle(store.clone()),
            WorkerConfig::new("herald-e2e-process")
                .concurrency(2)
                .poll_interval(Duration::from_millis(50)),
            registry,
            Arc::new(NoopEvents),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.close().await;

        assert_eq!(adapter.sends.load(Ordering::SeqCst), 2);

        let stats = stats::get_stats(&store, "herald-e2e-process:stats").await;
        assert_eq!(stats.get("success"), Some(&2));

        queue.clear().await.unwrap();
        stats::reset_stats(&store, "herald-e2e-process:stats").await;
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_cancelled_campaign_skips_adapter() {
        let store = store().await;
        let queue = JobQueue::new(store.clone(), "herald-e2e-cancel");
        queue.clear().await.unwrap();
        stats::reset_stats(&store, "herald-e2e-cancel:stats").await;

        cancel::cancel_campaign(&store, "e2e-c1", None).await.unwrap();

        let adapter = Arc::new(CountingAdapter {
            sends: AtomicUsize::new(0),
        });
        let registry = Arc::new(ChannelRegistry::new());
        registry.register(adapter.clone());

        let mut payload = telegram_payload(3).campaign("e2e-c1");
        payload.track_responses = true;
        payload.tracking_key = "herald-e2e-cancel:stats".to_string();
        queue
            .add("notify", payload, &JobOptions::default())
            .await
            .unwrap();

        let handle = WorkerManager::start(
            StoreConnection::Handle(store.clone()),
            WorkerConfig::new("herald-e2e-cancel")
                .concurrency(1)
                .poll_interval(Duration::from_millis(50)),
            registry,
            Arc::new(NoopEvents),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.close().await;

        // adapter never invoked, job settled, stats untouched
        assert_eq!(adapter.sends.load(Ordering::SeqCst), 0);
        assert_eq!(queue.job_counts().await.unwrap().total(), 0);
        assert!(stats::get_stats(&store, "herald-e2e-cancel:stats")
            .await
            .is_empty());

        cancel::clear_cancellation(&store, "e2e-c1").await.unwrap();
        queue.clear().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_unknown_channel_fails_job() {
        let store = store().await;
        let queue = JobQueue::new(store.clone(), "herald-e2e-unknown");
        queue.clear().await.unwrap();

        // empty registry: the job's channel resolves to nothing
        let registry = Arc::new(ChannelRegistry::new());

        queue
            .add("notify", telegram_payload(1), &JobOptions::default())
            .await
            .unwrap();

        let handle = WorkerManager::start(
            StoreConnection::Handle(store.clone()),
            WorkerConfig::new("herald-e2e-unknown")
                .concurrency(1)
                .poll_interval(Duration::from_millis(50)),
            registry,
            Arc::new(NoopEvents),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.close().await;

        // single-attempt job: dead and retained
        let counts = queue.job_counts().await.unwrap();
        assert_eq!(counts.total(), 0);

        queue.clear().await.unwrap();
    }
}
