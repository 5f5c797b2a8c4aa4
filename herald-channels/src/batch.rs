//! Adapter-agnostic batch send orchestration.

use futures::FutureExt;
use herald_core::{ChannelKind, MessageMeta, SendOutcome};
use herald_ratelimit::MinTimeLimiter;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Extract a printable message from a task panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Fan one job's recipients out through a per-recipient send function.
///
/// Outcomes are positional: the i-th outcome corresponds to the i-th
/// recipient regardless of completion order. Invalid pairs are skipped
/// without invoking `send_one`; panics inside a send are contained as
/// `INTERNAL_SEND_ERROR`; submissions rejected by a closed limiter become
/// `CANCELLED`. At most `concurrency` sends are in flight at once, and
/// every start passes through the limiter's spacing gate.
pub async fn send_batch<F, Fut>(
    channel: ChannelKind,
    recipients: &[String],
    metas: &[MessageMeta],
    limiter: &Arc<MinTimeLimiter>,
    concurrency: usize,
    send_one: F,
) -> Vec<SendOutcome>
where
    F: Fn(usize, String, MessageMeta) -> Fut,
    Fut: Future<Output = SendOutcome> + Send + 'static,
{
    let total = recipients.len();
    let mut outcomes: Vec<Option<SendOutcome>> = (0..total).map(|_| None).collect();
    let mut skipped = 0usize;
    let mut tasks: JoinSet<(usize, SendOutcome)> = JoinSet::new();

    for (i, recipient) in recipients.iter().enumerate() {
        if recipient.trim().is_empty() {
            outcomes[i] = Some(SendOutcome::failure(
                format!("invalid_recipient_at_index_{}", i),
                "Invalid recipient data",
            ));
            skipped += 1;
            continue;
        }

        let Some(meta) = metas.get(i) else {
            outcomes[i] = Some(SendOutcome::failure(recipient, "Missing meta for recipient"));
            skipped += 1;
            continue;
        };

        while tasks.len() >= concurrency.max(1) {
            if let Some(joined) = tasks.join_next().await {
                settle(&mut outcomes, joined);
            }
        }

        let limiter = limiter.clone();
        let recipient = recipient.clone();
        let fut = send_one(i, recipient.clone(), meta.clone());
        tasks.spawn(async move {
            match AssertUnwindSafe(limiter.schedule(fut)).catch_unwind().await {
                Ok(Ok(outcome)) => (i, outcome),
                Ok(Err(_)) => (i, SendOutcome::failure(recipient, "CANCELLED")),
                Err(panic) => (
                    i,
                    SendOutcome::failure_with_response(
                        recipient,
                        "INTERNAL_SEND_ERROR",
                        serde_json::Value::String(panic_message(panic)),
                    ),
                ),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        settle(&mut outcomes, joined);
    }

    let outcomes: Vec<SendOutcome> = outcomes
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                warn!(component = "batch", index = i, "send slot never settled");
                SendOutcome::failure(&recipients[i], "PROCESSING_ERROR_OR_SKIPPED")
            })
        })
        .collect();

    let success_count = outcomes.iter().filter(|o| o.is_success()).count();
    let failure_count = total - success_count - skipped;
    info!(
        component = "batch",
        channel = %channel,
        success_count,
        failure_count,
        skipped_count = skipped,
        total_attempted = total,
        "batch send finished"
    );

    outcomes
}

fn settle(
    outcomes: &mut [Option<SendOutcome>],
    joined: Result<(usize, SendOutcome), tokio::task::JoinError>,
) {
    match joined {
        Ok((i, outcome)) => outcomes[i] = Some(outcome),
        // the slot stays empty and is finalized below; the task future
        // itself already contains panics, so this is abort/shutdown only
        Err(err) => warn!(component = "batch", error = %err, "send task did not settle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::TelegramMeta;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter() -> Arc<MinTimeLimiter> {
        Arc::new(MinTimeLimiter::per_second(5, 10_000).unwrap())
    }

    fn metas(n: usize) -> Vec<MessageMeta> {
        (0..n)
            .map(|i| MessageMeta::Telegram(TelegramMeta::text(format!("m{}", i))))
            .collect()
    }

    #[tokio::test]
    async fn test_positional_results() {
        let recipients: Vec<String> = (0..8).map(|i| format!("chat-{}", i)).collect();
        let limiter = limiter();

        let outcomes = send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(8),
            &limiter,
            3,
            |i, recipient, _meta| async move {
                // later recipients finish first
                tokio::time::sleep(std::time::Duration::from_millis((8 - i as u64) * 2)).await;
                SendOutcome::success(recipient, json!({ "message_id": i }))
            },
        )
        .await;

        assert_eq!(outcomes.len(), 8);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.recipient, format!("chat-{}", i));
            assert_eq!(outcome.response.as_ref().unwrap()["message_id"], i);
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_skipped() {
        let recipients = vec!["ok".to_string(), "".to_string(), "  ".to_string()];
        let limiter = limiter();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let outcomes = send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(3),
            &limiter,
            5,
            move |_i, recipient, _meta| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    SendOutcome::success(recipient, json!(null))
                }
            },
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].recipient, "invalid_recipient_at_index_1");
        assert_eq!(outcomes[1].error.as_deref(), Some("Invalid recipient data"));
        assert_eq!(outcomes[2].recipient, "invalid_recipient_at_index_2");
        // the send function only runs for the valid pair
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_meta_skipped() {
        let recipients = vec!["a".to_string(), "b".to_string()];
        let limiter = limiter();

        let outcomes = send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(1),
            &limiter,
            5,
            |_i, recipient, _meta| async move { SendOutcome::success(recipient, json!(null)) },
        )
        .await;

        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].recipient, "b");
        assert_eq!(
            outcomes[1].error.as_deref(),
            Some("Missing meta for recipient")
        );
    }

    #[tokio::test]
    async fn test_panic_contained() {
        let recipients = vec!["a".to_string(), "b".to_string()];
        let limiter = limiter();

        let outcomes = send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(2),
            &limiter,
            5,
            |i, recipient, _meta| async move {
                if i == 0 {
                    panic!("boom");
                }
                SendOutcome::success(recipient, json!(null))
            },
        )
        .await;

        assert_eq!(outcomes[0].error.as_deref(), Some("INTERNAL_SEND_ERROR"));
        assert_eq!(outcomes[0].response, Some(json!("boom")));
        assert!(outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_in_flight_bounded() {
        let recipients: Vec<String> = (0..10).map(|i| format!("r{}", i)).collect();
        let limiter = Arc::new(MinTimeLimiter::per_second(10, 10_000).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (task_running, task_peak) = (running.clone(), peak.clone());

        send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(10),
            &limiter,
            2,
            move |_i, recipient, _meta| {
                let running = task_running.clone();
                let peak = task_peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    SendOutcome::success(recipient, json!(null))
                }
            },
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_closed_limiter_yields_cancelled() {
        let recipients = vec!["a".to_string()];
        let limiter = limiter();
        limiter.close();

        let outcomes = send_batch(
            ChannelKind::Telegram,
            &recipients,
            &metas(1),
            &limiter,
            5,
            |_i, recipient, _meta| async move { SendOutcome::success(recipient, json!(null)) },
        )
        .await;

        assert_eq!(outcomes[0].error.as_deref(), Some("CANCELLED"));
    }
}
