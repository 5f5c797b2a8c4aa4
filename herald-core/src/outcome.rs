//! Per-recipient send outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Counter map read back from a tracking key.
pub type StatsHash = HashMap<String, u64>;

/// Outcome status of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    /// The transport accepted the message.
    Success,
    /// The send failed; `error` carries the stable key.
    Error,
}

/// The outcome of one send attempt.
///
/// Outcomes are positional: the i-th outcome of a batch corresponds to the
/// i-th input recipient regardless of completion order. When the input was
/// unusable the `recipient` field holds a synthetic placeholder instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    /// Outcome status.
    pub status: SendStatus,
    /// Echoed recipient identifier or synthetic placeholder.
    pub recipient: String,
    /// Transport-specific payload on success; error descriptor on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Stable colon-delimited error key, suitable as a counter name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    /// Successful send with a transport response.
    pub fn success(recipient: impl Into<String>, response: Value) -> Self {
        Self {
            status: SendStatus::Success,
            recipient: recipient.into(),
            response: Some(response),
            error: None,
        }
    }

    /// Failed send with a stable error key.
    pub fn failure(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Error,
            recipient: recipient.into(),
            response: None,
            error: Some(error.into()),
        }
    }

    /// Failed send carrying an error descriptor payload.
    pub fn failure_with_response(
        recipient: impl Into<String>,
        error: impl Into<String>,
        response: Value,
    ) -> Self {
        Self {
            status: SendStatus::Error,
            recipient: recipient.into(),
            response: Some(response),
            error: Some(error.into()),
        }
    }

    /// Whether the send succeeded.
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }

    /// Counter name this outcome increments in a stats hash.
    ///
    /// `success` for successful sends, `error:<key>` otherwise. An error
    /// outcome with an empty key falls back to `error:UNKNOWN_ERROR`.
    pub fn counter_name(&self) -> String {
        match self.status {
            SendStatus::Success => "success".to_string(),
            SendStatus::Error => match self.error.as_deref() {
                Some(key) if !key.is_empty() => format!("error:{}", key),
                _ => "error:UNKNOWN_ERROR".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_outcome() {
        let outcome = SendOutcome::success("a@example.com", json!({"message_id": "m1"}));

        assert!(outcome.is_success());
        assert_eq!(outcome.recipient, "a@example.com");
        assert_eq!(outcome.counter_name(), "success");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_failure_outcome() {
        let outcome = SendOutcome::failure("a@example.com", "MISSING_SUBJECT");

        assert!(!outcome.is_success());
        assert_eq!(outcome.counter_name(), "error:MISSING_SUBJECT");
    }

    #[test]
    fn test_empty_error_key_falls_back() {
        let outcome = SendOutcome::failure("a@example.com", "");
        assert_eq!(outcome.counter_name(), "error:UNKNOWN_ERROR");
    }

    #[test]
    fn test_failure_with_response() {
        let outcome =
            SendOutcome::failure_with_response("t", "INVALID_PAYLOAD", json!("Message must contain notification or data"));

        assert!(!outcome.is_success());
        assert!(outcome.response.is_some());
    }

    #[test]
    fn test_serialized_shape() {
        let outcome = SendOutcome::failure("x", "500:server_error");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["recipient"], "x");
        assert_eq!(json["error"], "500:server_error");
        assert!(json.get("response").is_none());
    }
}
