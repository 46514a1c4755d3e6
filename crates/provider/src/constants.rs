//! OpenRouter client constants
//!
//! Public identifiers for the completion API. The API keys themselves are
//! managed by the key pool and never appear here.

/// Default API host; override with `upstream.base_url` for self-hosted gateways.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai";

/// Chat completions path appended to the base URL.
pub const COMPLETIONS_PATH: &str = "/api/v1/chat/completions";

/// Default model routed through OpenRouter.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Application URL sent as `HTTP-Referer` when none is configured.
pub const DEFAULT_APP_URL: &str = "http://localhost:8080";

/// Application name sent as `X-Title` for OpenRouter attribution.
pub const CLIENT_TITLE: &str = "Fitness Chat AI";

/// Header carrying the calling application's URL.
pub const REFERER_HEADER: &str = "HTTP-Referer";

/// Header carrying the calling application's display name.
pub const TITLE_HEADER: &str = "X-Title";
