//! Retry state machine
//!
//! Pure state machine: receives events, returns the new state. The caller
//! (`ResilientCaller::complete`) performs the upstream call implied by
//! `Attempting` and feeds the outcome back in.
//!
//! ```text
//! Attempting{n} --Replied------------------------> Succeeded
//! Attempting{n} --Failed(RateLimited), n < max---> RateLimited{n}
//! Attempting{n} --Failed(RateLimited), n == max--> Failed(UpstreamExhausted)
//! Attempting{n} --Failed(Fatal)------------------> Failed(Upstream)
//! RateLimited{n} --Rotated-----------------------> Attempting{n + 1}
//! ```
//!
//! Attempts are numbered from 1, so the number of upstream calls a request
//! makes is the `attempt` of its last `Attempting` state and can never exceed
//! `max_attempts`.

use provider::{ErrorClassification, UpstreamFailure};

use crate::error::CompletionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// About to make upstream call number `attempt`
    Attempting { attempt: usize },
    /// Call number `attempt` was rate limited and budget remains
    RateLimited {
        attempt: usize,
        last: UpstreamFailure,
    },
    /// Terminal: upstream replied
    Succeeded { reply: String, attempts: usize },
    /// Terminal: request failed
    Failed { error: CompletionError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// Upstream returned the reply text
    Replied(String),
    /// Upstream call failed and was classified
    Failed {
        failure: UpstreamFailure,
        classification: ErrorClassification,
    },
    /// Next key selected after a rate limit
    Rotated,
}

impl RetryState {
    /// Initial state for a request with the given budget.
    pub fn start(max_attempts: usize) -> Self {
        if max_attempts == 0 {
            Self::Failed {
                error: CompletionError::NoCredentialsConfigured,
            }
        } else {
            Self::Attempting { attempt: 1 }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Handle a state transition. Pure function: no I/O.
///
/// Events that make no sense in the current state leave it unchanged.
pub fn handle_event(state: RetryState, event: RetryEvent, max_attempts: usize) -> RetryState {
    match (state, event) {
        // --- Attempting ---
        (RetryState::Attempting { attempt }, RetryEvent::Replied(reply)) => RetryState::Succeeded {
            reply,
            attempts: attempt,
        },

        (
            RetryState::Attempting { attempt },
            RetryEvent::Failed {
                failure,
                classification: ErrorClassification::RateLimited,
            },
        ) if attempt < max_attempts => RetryState::RateLimited {
            attempt,
            last: failure,
        },

        (
            RetryState::Attempting { attempt },
            RetryEvent::Failed {
                failure,
                classification: ErrorClassification::RateLimited,
            },
        ) => RetryState::Failed {
            error: CompletionError::UpstreamExhausted {
                attempts: attempt,
                last: failure,
            },
        },

        (
            RetryState::Attempting { .. },
            RetryEvent::Failed {
                failure,
                classification: ErrorClassification::Fatal,
            },
        ) => RetryState::Failed {
            error: CompletionError::Upstream(failure),
        },

        // --- RateLimited ---
        (RetryState::RateLimited { attempt, .. }, RetryEvent::Rotated) => {
            RetryState::Attempting {
                attempt: attempt + 1,
            }
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => state,
    }
}
