//! Errors from a logical completion request

use provider::UpstreamFailure;

/// Final outcome of a failed completion request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The pool is empty or the attempt budget is zero; no call was made.
    #[error("No API keys configured")]
    NoCredentialsConfigured,

    /// Every attempt in the budget was rate limited.
    #[error("all {attempts} attempts were rate limited; last error: {last}")]
    UpstreamExhausted {
        attempts: usize,
        last: UpstreamFailure,
    },

    /// A non-rate-limit failure ended the request.
    #[error("{0}")]
    Upstream(UpstreamFailure),
}

impl CompletionError {
    /// The upstream failure behind this error, if any call was made.
    pub fn upstream_failure(&self) -> Option<&UpstreamFailure> {
        match self {
            Self::NoCredentialsConfigured => None,
            Self::UpstreamExhausted { last, .. } => Some(last),
            Self::Upstream(failure) => Some(failure),
        }
    }

    /// Developer-facing detail: the upstream body or error message.
    pub fn detail(&self) -> serde_json::Value {
        match self.upstream_failure() {
            Some(failure) => failure.detail(),
            None => serde_json::Value::String(self.to_string()),
        }
    }
}

impl From<key_pool::Error> for CompletionError {
    fn from(err: key_pool::Error) -> Self {
        match err {
            key_pool::Error::PoolEmpty => Self::NoCredentialsConfigured,
        }
    }
}

/// Result alias for completion requests.
pub type Result<T> = std::result::Result<T, CompletionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_empty_maps_to_no_credentials() {
        let err: CompletionError = key_pool::Error::PoolEmpty.into();
        assert_eq!(err, CompletionError::NoCredentialsConfigured);
        assert_eq!(err.to_string(), "No API keys configured");
        assert!(err.upstream_failure().is_none());
    }

    #[test]
    fn exhausted_carries_last_failure_detail() {
        let err = CompletionError::UpstreamExhausted {
            attempts: 2,
            last: UpstreamFailure::Http {
                status: 429,
                body: r#"{"error":{"message":"slow down"}}"#.into(),
            },
        };
        assert!(err.to_string().starts_with("all 2 attempts were rate limited"));
        assert_eq!(err.detail()["error"]["message"], "slow down");
    }

    #[test]
    fn upstream_error_displays_cause() {
        let err = CompletionError::Upstream(UpstreamFailure::Timeout("deadline".into()));
        assert_eq!(err.to_string(), "upstream request timed out: deadline");
        assert_eq!(err.detail(), "upstream request timed out: deadline");
    }
}
