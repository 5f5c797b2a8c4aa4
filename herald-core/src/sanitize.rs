//! Error-key sanitization and log redaction.
//!
//! Error keys double as counter names in the stats hash, so transport
//! error messages are normalized into short, stable, colon-delimited keys
//! before they leave an adapter. All adapters share this one table.

/// Maximum length of a sanitized error key, in characters.
pub const MAX_ERROR_KEY_LEN: usize = 255;

/// Punctuation stripped from error message bodies.
const STRIPPED: &[char] = &[
    '.', ':', ';', ',', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\',
];

/// Build a `<code>:<sanitized-message>` error key.
///
/// Whitespace in the message becomes `_`, the punctuation table is
/// stripped, and the whole key is truncated to [`MAX_ERROR_KEY_LEN`].
pub fn sanitize_error_key(code: &str, message: &str) -> String {
    let mut key = String::with_capacity(code.len() + 1 + message.len());
    key.push_str(code);
    key.push(':');
    for ch in message.chars() {
        if ch.is_whitespace() {
            key.push('_');
        } else if !STRIPPED.contains(&ch) {
            key.push(ch);
        }
    }
    truncate_error_key(key)
}

/// Truncate a key to [`MAX_ERROR_KEY_LEN`] characters.
pub fn truncate_error_key(key: String) -> String {
    if key.chars().count() <= MAX_ERROR_KEY_LEN {
        return key;
    }
    key.chars().take(MAX_ERROR_KEY_LEN).collect()
}

/// Redact a recipient identifier for logging, keeping the last 10 chars.
pub fn redact_recipient(recipient: &str) -> String {
    let chars: Vec<char> = recipient.chars().collect();
    if chars.len() <= 10 {
        return recipient.to_string();
    }
    let tail: String = chars[chars.len() - 10..].iter().collect();
    format!("…{}", tail)
}
