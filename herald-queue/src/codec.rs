//! Wire codec for queued jobs.

use crate::{QueueError, QueuedJob, Result};

/// Serde boundary between job records and the store.
///
/// Jobs are stored as JSON with camelCase field names so that payloads
/// written by other producers of the same wire shape decode cleanly.
pub struct JobCodec;

impl JobCodec {
    /// Serialize a job record.
    pub fn encode(job: &QueuedJob) -> Result<String> {
        serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Deserialize a job record.
    pub fn decode(raw: &str) -> Result<QueuedJob> {
        serde_json::from_str(raw).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobOptions;
    use herald_core::{ChannelKind, JobPayload, MessageMeta, TelegramMeta};

    fn job() -> QueuedJob {
        let payload = JobPayload::new(ChannelKind::Telegram)
            .recipient("100", MessageMeta::Telegram(TelegramMeta::text("hi")))
            .tracking("t:stats")
            .campaign("c1");
        QueuedJob::new("notify", payload, &JobOptions::default())
    }

    #[test]
    fn test_round_trip() {
        let original = job();
        let encoded = JobCodec::encode(&original).unwrap();
        let decoded = JobCodec::decode(&encoded).unwrap();

        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.name, "notify");
        assert_eq!(decoded.payload.user_ids, vec!["100"]);
        assert_eq!(decoded.payload.campaign_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_wire_field_names() {
        let encoded = JobCodec::encode(&job()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();

        assert!(value.get("maxAttempts").is_some());
        assert!(value.get("removeOnComplete").is_some());
        assert!(value["payload"].get("userIds").is_some());
        assert!(value["payload"].get("trackingKey").is_some());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(JobCodec::decode("not json").is_err());
        assert!(JobCodec::decode("{}").is_err());
    }
}
