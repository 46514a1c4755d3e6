//! Failure of a single upstream attempt

/// Why one upstream completion call did not produce a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamFailure {
    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("upstream request failed: {0}")]
    Network(String),

    /// 2xx response whose body did not contain a first choice with content.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamFailure {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// HTTP status if upstream responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Debug detail suitable for echoing back to a developer.
    ///
    /// HTTP failures yield the upstream body, parsed as JSON when possible.
    /// Everything else yields the error message as a string.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            Self::Http { body, .. } => serde_json::from_str(body)
                .unwrap_or_else(|_| serde_json::Value::String(body.clone())),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

/// Result alias for a single provider call.
pub type Result<T> = std::result::Result<T, UpstreamFailure>;
