//! OpenRouter provider: one reqwest POST per attempt
//!
//! Sends the chat messages with the selected key as a Bearer token plus the
//! attribution headers OpenRouter uses to identify the calling app. Success
//! responses are reduced to the first choice's text; everything else is
//! returned as an `UpstreamFailure` for the retry loop to classify.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::classify::classify_status;
use crate::constants::{
    CLIENT_TITLE, COMPLETIONS_PATH, DEFAULT_APP_URL, DEFAULT_BASE_URL, DEFAULT_MODEL,
    REFERER_HEADER, TITLE_HEADER,
};
use crate::error::{Result, UpstreamFailure};
use crate::wire::{ChatMessage, ChatRequest, ChatResponse};
use crate::{ChatProvider, ErrorClassification};

/// Connection settings for the OpenRouter API.
#[derive(Debug, Clone)]
pub struct OpenRouterSettings {
    pub base_url: String,
    pub model: String,
    /// Sent as `HTTP-Referer`
    pub app_url: String,
    /// Sent as `X-Title`
    pub title: String,
    /// Per-attempt I/O timeout
    pub timeout: Duration,
}

impl Default for OpenRouterSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            app_url: DEFAULT_APP_URL.to_string(),
            title: CLIENT_TITLE.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenRouterProvider {
    client: reqwest::Client,
    endpoint: String,
    settings: OpenRouterSettings,
}

impl OpenRouterProvider {
    pub fn new(client: reqwest::Client, settings: OpenRouterSettings) -> Self {
        let endpoint = format!(
            "{}{}",
            settings.base_url.trim_end_matches('/'),
            COMPLETIONS_PATH
        );
        Self {
            client,
            endpoint,
            settings,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    async fn send(&self, api_key: &Secret<String>, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose())
            .header(REFERER_HEADER, &self.settings.app_url)
            .header(TITLE_HEADER, &self.settings.title)
            .timeout(self.settings.timeout)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamFailure::from_reqwest)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(UpstreamFailure::from_reqwest)?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "upstream returned error status");
            return Err(UpstreamFailure::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamFailure::Malformed(format!("invalid completion body: {e}")))?;

        parsed
            .into_first_content()
            .ok_or_else(|| UpstreamFailure::Malformed("response contained no choice content".into()))
    }
}

impl ChatProvider for OpenRouterProvider {
    fn id(&self) -> &str {
        "openrouter"
    }

    fn complete<'a>(
        &'a self,
        api_key: &'a Secret<String>,
        messages: &'a [ChatMessage],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.send(api_key, messages))
    }

    fn classify_error(&self, status: u16, body: &str) -> ErrorClassification {
        classify_status(status, body)
    }
}
