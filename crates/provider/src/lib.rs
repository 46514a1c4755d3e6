//! Upstream chat-completion provider
//!
//! Defines the `ChatProvider` trait that decouples the retry loop from the
//! HTTP details of the completion API. `OpenRouterProvider` is the production
//! implementation; tests substitute scripted providers to count calls and
//! inject failures.
//!
//! A provider does two things for the caller:
//! - `complete` performs exactly one upstream call with one API key
//! - `classify_error` decides whether an HTTP failure should rotate to the
//!   next key or end the request

pub mod classify;
pub mod constants;
pub mod error;
pub mod openrouter;
pub mod wire;

pub use classify::{RATE_LIMIT_ERROR_CODE, classify_status, upstream_error_code};
pub use error::{Result, UpstreamFailure};
pub use openrouter::{OpenRouterProvider, OpenRouterSettings};
pub use wire::{ChatMessage, ChatRequest, ChatResponse, Role};

use common::Secret;
use std::future::Future;
use std::pin::Pin;

/// What the retry loop should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Key is throttled or out of quota (429, 402, `rate_limit_exceeded`);
    /// rotate to the next key if the attempt budget allows.
    RateLimited,
    /// Anything else; stop and report.
    Fatal,
}

/// Abstraction over the upstream completion API.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn ChatProvider>`).
pub trait ChatProvider: Send + Sync {
    /// Identifier for logging (e.g. "openrouter")
    fn id(&self) -> &str;

    /// Send one completion request authenticated with `api_key` and return
    /// the text of the first choice.
    fn complete<'a>(
        &'a self,
        api_key: &'a Secret<String>,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Classify a non-2xx upstream response.
    fn classify_error(&self, status: u16, body: &str) -> ErrorClassification;
}

/// Classify any attempt failure through `provider`.
///
/// Only HTTP error responses can be rate limits; transport failures, timeouts
/// and unparseable success bodies are always fatal.
pub fn classify_failure(
    provider: &dyn ChatProvider,
    failure: &UpstreamFailure,
) -> ErrorClassification {
    match failure {
        UpstreamFailure::Http { status, body } => provider.classify_error(*status, body),
        UpstreamFailure::Timeout(_)
        | UpstreamFailure::Network(_)
        | UpstreamFailure::Malformed(_) => ErrorClassification::Fatal,
    }
}
