//! Resilient chat completion over a rotating key pool
//!
//! `ResilientCaller` turns one user message into one reply. Each attempt
//! takes the next key from the pool; when upstream answers with a rate limit
//! the caller rotates to the next key and tries again, up to an attempt
//! budget that defaults to the pool size. Any other failure ends the request
//! immediately.
//!
//! The retry loop is driven by the pure state machine in [`retry`], so the
//! bounded-retry rules can be exercised without any I/O.

pub mod caller;
pub mod error;
pub mod prompt;
pub mod retry;

pub use caller::ResilientCaller;
pub use error::{CompletionError, Result};
pub use prompt::FITNESS_COACH_PROMPT;
pub use retry::{RetryEvent, RetryState, handle_event};
