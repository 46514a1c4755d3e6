//! Rate-limit detection for completion API responses
//!
//! OpenRouter signals a throttled or exhausted key in three ways: HTTP 429
//! (too many requests), HTTP 402 (credits exhausted on the key), or an error
//! body carrying `error.code = "rate_limit_exceeded"` regardless of status.
//! All three mean "try the next key". Every other failure is final.

use crate::ErrorClassification;

/// Upstream error code meaning the key hit its rate limit.
pub const RATE_LIMIT_ERROR_CODE: &str = "rate_limit_exceeded";

/// Extract `error.code` from an upstream JSON error body.
///
/// Numeric codes are rendered as strings; non-JSON bodies yield `None`.
pub fn upstream_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")?.get("code")? {
        serde_json::Value::String(code) => Some(code.clone()),
        serde_json::Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

/// Classify a non-2xx upstream response by status and body.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    match status {
        429 | 402 => ErrorClassification::RateLimited,
        _ if upstream_error_code(body).as_deref() == Some(RATE_LIMIT_ERROR_CODE) => {
            ErrorClassification::RateLimited
        }
        _ => ErrorClassification::Fatal,
    }
}
