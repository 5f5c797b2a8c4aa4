//! Outcome counter tracking in the shared store.
//!
//! Tracking must never fail a send: every store error in this module is
//! caught, logged, and swallowed.

use herald_core::{SendOutcome, StatsHash};
use herald_redis::Store;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Counter used when a tracked response has an unrecognized shape.
const INVALID_FORMAT_COUNTER: &str = "error:invalid_response_format";

/// Fold counter names into `(name, increment)` pairs, preserving the
/// first-seen order so pipelines stay deterministic.
fn fold_counters<I: IntoIterator<Item = String>>(names: I) -> Vec<(String, i64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, i64> = HashMap::new();
    for name in names {
        if !counts.contains_key(&name) {
            order.push(name.clone());
        }
        *counts.entry(name).or_insert(0) += 1;
    }
    order
        .into_iter()
        .map(|name| {
            let count = counts[&name];
            (name, count)
        })
        .collect()
}

fn counter_for_value(item: &Value) -> String {
    if item["status"].as_str() == Some("success") {
        "success".to_string()
    } else {
        match item["error"].as_str() {
            Some(key) if !key.is_empty() => format!("error:{}", key),
            _ => "error:UNKNOWN_ERROR".to_string(),
        }
    }
}

/// Record a batch of typed send outcomes under a tracking key.
///
/// All increments are applied as one atomic pipeline.
pub async fn record_outcomes(store: &Store, tracking_key: &str, outcomes: &[SendOutcome]) {
    if outcomes.is_empty() {
        return;
    }

    let increments = fold_counters(outcomes.iter().map(SendOutcome::counter_name));
    apply(store, tracking_key, increments).await;
}

/// Record a loosely-shaped tracked response under a tracking key.
///
/// Sequences contribute one increment per element; a single object with
/// `success: false` contributes one error entry; anything else
/// unrecognized contributes one `error:invalid_response_format`.
/// Empty or null responses write nothing.
pub async fn record_value(store: &Store, tracking_key: &str, response: &Value) {
    let increments = match response {
        Value::Null => return,
        Value::Array(items) if items.is_empty() => return,
        Value::Array(items) => fold_counters(items.iter().map(counter_for_value)),
        Value::Object(object) if object.get("success") == Some(&Value::Bool(false)) => {
            let name = match object.get("error").and_then(Value::as_str) {
                Some(key) if !key.is_empty() => format!("error:{}", key),
                _ => "error:UNKNOWN_ERROR".to_string(),
            };
            vec![(name, 1)]
        }
        _ => {
            warn!(
                component = "stats",
                tracking_key,
                "tracked response has unrecognized shape"
            );
            vec![(INVALID_FORMAT_COUNTER.to_string(), 1)]
        }
    };

    apply(store, tracking_key, increments).await;
}

/// Record one error counter, used when job processing fails outright.
pub async fn record_error(store: &Store, tracking_key: &str, error: &str) {
    let name = if error.is_empty() {
        "error:UNKNOWN_ERROR".to_string()
    } else {
        format!("error:{}", error)
    };
    apply(store, tracking_key, vec![(name, 1)]).await;
}

async fn apply(store: &Store, tracking_key: &str, increments: Vec<(String, i64)>) {
    if increments.is_empty() {
        return;
    }

    let total: i64 = increments.iter().map(|(_, c)| c).sum();
    if let Err(e) = store.hincr_many(tracking_key, &increments).await {
        error!(
            component = "stats",
            tracking_key,
            error = %e,
            "failed to record outcome counters"
        );
    } else {
        debug!(component = "stats", tracking_key, total, "outcome counters recorded");
    }
}

/// Read the full counter hash for a tracking key.
///
/// Returns an empty map on read failure.
pub async fn get_stats(store: &Store, tracking_key: &str) -> StatsHash {
    match store.hgetall_counts(tracking_key).await {
        Ok(stats) => stats,
        Err(e) => {
            error!(
                component = "stats",
                tracking_key,
                error = %e,
                "failed to read stats, returning empty"
            );
            StatsHash::new()
        }
    }
}

/// Delete the counter hash for a tracking key.
pub async fn reset_stats(store: &Store, tracking_key: &str) {
    if let Err(e) = store.delete(tracking_key).await {
        error!(
            component = "stats",
            tracking_key,
            error = %e,
            "failed to reset stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fold_counters_sums_duplicates() {
        let folded = fold_counters(
            [
                "success".to_string(),
                "error:MISSING_TEXT".to_string(),
                "success".to_string(),
                "success".to_string(),
            ]
            .into_iter(),
        );

        assert_eq!(
            folded,
            vec![
                ("success".to_string(), 3),
                ("error:MISSING_TEXT".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_counter_for_success_value() {
        assert_eq!(
            counter_for_value(&json!({"status": "success", "recipient": "a"})),
            "success"
        );
    }

    #[test]
    fn test_counter_for_error_value() {
        assert_eq!(
            counter_for_value(&json!({"status": "error", "error": "410:gone"})),
            "error:410:gone"
        );
    }

    #[test]
    fn test_counter_for_error_without_key() {
        assert_eq!(
            counter_for_value(&json!({"status": "error"})),
            "error:UNKNOWN_ERROR"
        );
        // not outcome-shaped at all, still exactly one increment
        assert_eq!(counter_for_value(&json!({"odd": true})), "error:UNKNOWN_ERROR");
    }

    #[test]
    fn test_sequence_increment_total_matches_length() {
        let items = vec![
            json!({"status": "success"}),
            json!({"status": "error", "error": "X"}),
            json!({"weird": 1}),
        ];
        let folded = fold_counters(items.iter().map(counter_for_value));
        let total: i64 = folded.iter().map(|(_, c)| c).sum();

        assert_eq!(total, items.len() as i64);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_record_and_reset_round_trip() {
        use herald_core::SendOutcome;
        use herald_redis::RedisConfig;

        let store = Store::connect(RedisConfig::default()).await.unwrap();
        let key = "herald:test:stats:roundtrip";
        reset_stats(&store, key).await;

        let outcomes = vec![
            SendOutcome::success("a", json!({})),
            SendOutcome::success("b", json!({})),
            SendOutcome::failure("c", "MISSING_SUBJECT"),
        ];
        record_outcomes(&store, key, &outcomes).await;

        let stats = get_stats(&store, key).await;
        assert_eq!(stats.get("success"), Some(&2));
        assert_eq!(stats.get("error:MISSING_SUBJECT"), Some(&1));

        reset_stats(&store, key).await;
        assert!(get_stats(&store, key).await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_single_failure_object() {
        use herald_redis::RedisConfig;

        let store = Store::connect(RedisConfig::default()).await.unwrap();
        let key = "herald:test:stats:single";
        reset_stats(&store, key).await;

        record_value(&store, key, &json!({"success": false, "error": "THROTTLED"})).await;

        let stats = get_stats(&store, key).await;
        assert_eq!(stats.get("error:THROTTLED"), Some(&1));

        reset_stats(&store, key).await;
    }
}
