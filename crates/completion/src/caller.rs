//! Resilient completion caller
//!
//! Runs the retry state machine against a real `ChatProvider`: each
//! `Attempting` state takes the next key from the shared pool and makes one
//! upstream call, each `RateLimited` state records a rotation before the next
//! attempt. Because every attempt advances the shared cursor, concurrent
//! requests interleave their use of the pool.

use std::sync::Arc;

use key_pool::KeyPool;
use provider::{ChatMessage, ChatProvider, ErrorClassification, classify_failure};
use tracing::{debug, error, info, warn};

use crate::error::{CompletionError, Result};
use crate::prompt::FITNESS_COACH_PROMPT;
use crate::retry::{RetryEvent, RetryState, handle_event};

pub struct ResilientCaller {
    pool: Arc<KeyPool>,
    provider: Arc<dyn ChatProvider>,
    system_prompt: String,
    /// Configured attempt budget; `None` means one attempt per pooled key.
    max_attempts: Option<usize>,
}

impl ResilientCaller {
    pub fn new(pool: Arc<KeyPool>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            pool,
            provider,
            system_prompt: FITNESS_COACH_PROMPT.to_string(),
            max_attempts: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    /// Attempts per request when the caller does not override it.
    pub fn attempt_budget(&self) -> usize {
        self.max_attempts.unwrap_or_else(|| self.pool.len())
    }

    /// Turn one user message into one reply.
    ///
    /// `max_attempts` overrides the configured budget for this request.
    /// Fails with `NoCredentialsConfigured` before any upstream call when the
    /// pool is empty or the budget is zero.
    pub async fn complete(&self, user_message: &str, max_attempts: Option<usize>) -> Result<String> {
        let max_attempts = max_attempts.unwrap_or_else(|| self.attempt_budget());
        if self.pool.is_empty() {
            return Err(CompletionError::NoCredentialsConfigured);
        }

        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(user_message),
        ];

        let mut state = RetryState::start(max_attempts);
        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let credential = self.pool.take_next()?;
                    let slot = credential.slot();
                    debug!(
                        attempt,
                        max_attempts,
                        slot,
                        provider = self.provider.id(),
                        "sending completion request"
                    );

                    let event = match self.provider.complete(credential.key(), &messages).await {
                        Ok(reply) => {
                            record_attempt("success");
                            RetryEvent::Replied(reply)
                        }
                        Err(failure) => {
                            let classification = classify_failure(self.provider.as_ref(), &failure);
                            match classification {
                                ErrorClassification::RateLimited => {
                                    record_attempt("rate_limited");
                                    warn!(
                                        attempt,
                                        slot,
                                        status = ?failure.status(),
                                        "rate limit hit, trying next key"
                                    );
                                }
                                ErrorClassification::Fatal => {
                                    record_attempt("error");
                                    error!(attempt, slot, error = %failure, "upstream request failed");
                                }
                            }
                            RetryEvent::Failed {
                                failure,
                                classification,
                            }
                        }
                    };
                    handle_event(RetryState::Attempting { attempt }, event, max_attempts)
                }
                rate_limited @ RetryState::RateLimited { .. } => {
                    record_rotation();
                    handle_event(rate_limited, RetryEvent::Rotated, max_attempts)
                }
                RetryState::Succeeded { reply, attempts } => {
                    info!(attempts, "completion succeeded");
                    return Ok(reply);
                }
                RetryState::Failed { error } => {
                    if let CompletionError::UpstreamExhausted { attempts, .. } = &error {
                        warn!(attempts, "every attempt was rate limited");
                    }
                    return Err(error);
                }
            };
        }
    }
}

fn record_attempt(outcome: &'static str) {
    metrics::counter!("relay_upstream_attempts_total", "outcome" => outcome).increment(1);
}

fn record_rotation() {
    metrics::counter!("relay_key_rotations_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use provider::{UpstreamFailure, classify_status};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Provider that replays a script of outcomes and records each call.
    ///
    /// Once the script runs out, every call returns `fallback`.
    struct ScriptedProvider {
        script: Mutex<VecDeque<provider::Result<String>>>,
        fallback: provider::Result<String>,
        calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<provider::Result<String>>, fallback: provider::Result<String>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn always(outcome: provider::Result<String>) -> Self {
            Self::new(Vec::new(), outcome)
        }

        fn keys_used(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn complete<'a>(
            &'a self,
            api_key: &'a Secret<String>,
            messages: &'a [ChatMessage],
        ) -> Pin<Box<dyn Future<Output = provider::Result<String>> + Send + 'a>> {
            self.calls
                .lock()
                .unwrap()
                .push((api_key.expose().clone(), messages.to_vec()));
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            Box::pin(async move { outcome })
        }

        fn classify_error(&self, status: u16, body: &str) -> ErrorClassification {
            classify_status(status, body)
        }
    }

    fn too_many_requests() -> provider::Result<String> {
        Err(UpstreamFailure::Http {
            status: 429,
            body: r#"{"error":{"code":429,"message":"Rate limit exceeded"}}"#.into(),
        })
    }

    fn pool_of(keys: &[&str]) -> Arc<KeyPool> {
        Arc::new(KeyPool::new(
            keys.iter().map(|k| Some(Secret::new(k.to_string()))),
        ))
    }

    fn caller(keys: &[&str], provider: &Arc<ScriptedProvider>) -> ResilientCaller {
        ResilientCaller::new(pool_of(keys), provider.clone())
    }

    #[tokio::test]
    async fn first_attempt_success_makes_one_call() {
        let provider = Arc::new(ScriptedProvider::always(Ok("Stay hydrated.".into())));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        let reply = caller.complete("Tips?", None).await.unwrap();

        assert_eq!(reply, "Stay hydrated.");
        assert_eq!(provider.keys_used(), vec!["k1"]);
    }

    #[tokio::test]
    async fn sends_system_prompt_then_user_message() {
        let provider = Arc::new(ScriptedProvider::always(Ok("ok".into())));
        let caller = caller(&["k1"], &provider);

        caller.complete("How many rest days?", None).await.unwrap();

        let calls = provider.calls.lock().unwrap();
        let messages = &calls[0].1;
        assert_eq!(
            messages,
            &vec![
                ChatMessage::system(FITNESS_COACH_PROMPT),
                ChatMessage::user("How many rest days?"),
            ]
        );
    }

    #[tokio::test]
    async fn custom_system_prompt_is_used() {
        let provider = Arc::new(ScriptedProvider::always(Ok("ok".into())));
        let caller = caller(&["k1"], &provider).with_system_prompt("You are terse.");

        caller.complete("hi", None).await.unwrap();

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].1[0], ChatMessage::system("You are terse."));
    }

    #[tokio::test]
    async fn all_rate_limited_tries_each_key_once_then_exhausts() {
        let provider = Arc::new(ScriptedProvider::always(too_many_requests()));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        let err = caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(provider.keys_used(), vec!["k1", "k2", "k3"]);
        match err {
            CompletionError::UpstreamExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status(), Some(429));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn network_error_stops_after_one_call() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Err(UpstreamFailure::Network("connection reset".into()))],
            Ok("never reached".into()),
        ));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        let err = caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            err,
            CompletionError::Upstream(UpstreamFailure::Network("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn timeout_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![Err(UpstreamFailure::Timeout("deadline elapsed".into()))],
            Ok("never reached".into()),
        ));
        let caller = caller(&["k1", "k2"], &provider);

        let err = caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(provider.call_count(), 1);
        assert!(matches!(
            err,
            CompletionError::Upstream(UpstreamFailure::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn rotates_past_rate_limits_to_success() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                too_many_requests(),
                Err(UpstreamFailure::Http {
                    status: 402,
                    body: r#"{"error":{"code":402,"message":"Insufficient credits"}}"#.into(),
                }),
                Err(UpstreamFailure::Http {
                    status: 400,
                    body: r#"{"error":{"code":"rate_limit_exceeded"}}"#.into(),
                }),
                Ok("Warm up first.".into()),
            ],
            Ok("unused".into()),
        ));
        let caller = caller(&["k1", "k2", "k3", "k4"], &provider);

        let reply = caller.complete("Tips?", None).await.unwrap();

        assert_eq!(reply, "Warm up first.");
        assert_eq!(provider.keys_used(), vec!["k1", "k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn fatal_after_rate_limit_stops_there() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                too_many_requests(),
                Err(UpstreamFailure::Http {
                    status: 500,
                    body: "boom".into(),
                }),
            ],
            Ok("never reached".into()),
        ));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        let err = caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(provider.call_count(), 2);
        assert_eq!(err.upstream_failure().and_then(|f| f.status()), Some(500));
        assert!(matches!(err, CompletionError::Upstream(_)));
    }

    #[tokio::test]
    async fn empty_pool_fails_without_calling_upstream() {
        let provider = Arc::new(ScriptedProvider::always(Ok("unused".into())));
        let caller = caller(&[], &provider);

        let err = caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(err, CompletionError::NoCredentialsConfigured);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_budget_fails_without_calling_upstream() {
        let provider = Arc::new(ScriptedProvider::always(Ok("unused".into())));
        let caller = caller(&["k1"], &provider);

        let err = caller.complete("Tips?", Some(0)).await.unwrap_err();

        assert_eq!(err, CompletionError::NoCredentialsConfigured);
        assert_eq!(provider.call_count(), 0);
        assert_eq!(caller.pool().cursor(), 0);
    }

    #[tokio::test]
    async fn budget_larger_than_pool_revisits_keys() {
        let provider = Arc::new(ScriptedProvider::always(too_many_requests()));
        let caller = caller(&["k1", "k2"], &provider);

        let err = caller.complete("Tips?", Some(5)).await.unwrap_err();

        assert_eq!(provider.keys_used(), vec!["k1", "k2", "k1", "k2", "k1"]);
        assert!(matches!(
            err,
            CompletionError::UpstreamExhausted { attempts: 5, .. }
        ));
    }

    #[tokio::test]
    async fn budget_smaller_than_pool_stops_early() {
        let provider = Arc::new(ScriptedProvider::always(too_many_requests()));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        let err = caller.complete("Tips?", Some(1)).await.unwrap_err();

        assert_eq!(provider.call_count(), 1);
        assert!(matches!(
            err,
            CompletionError::UpstreamExhausted { attempts: 1, .. }
        ));
    }

    #[tokio::test]
    async fn configured_budget_applies_when_not_overridden() {
        let provider = Arc::new(ScriptedProvider::always(too_many_requests()));
        let caller = caller(&["k1", "k2", "k3"], &provider).with_max_attempts(Some(2));
        assert_eq!(caller.attempt_budget(), 2);

        caller.complete("Tips?", None).await.unwrap_err();

        assert_eq!(provider.keys_used(), vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn rotation_continues_across_requests() {
        let provider = Arc::new(ScriptedProvider::always(Ok("ok".into())));
        let caller = caller(&["k1", "k2", "k3"], &provider);

        for _ in 0..4 {
            caller.complete("Tips?", None).await.unwrap();
        }

        assert_eq!(provider.keys_used(), vec!["k1", "k2", "k3", "k1"]);
    }

    #[tokio::test]
    async fn concurrent_requests_share_the_cursor() {
        let provider = Arc::new(ScriptedProvider::always(Ok("ok".into())));
        let caller = Arc::new(caller(&["k1", "k2", "k3", "k4"], &provider));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let caller = caller.clone();
                tokio::spawn(async move { caller.complete("Tips?", None).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut keys = provider.keys_used();
        keys.sort();
        assert_eq!(keys, vec!["k1", "k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn attempts_and_rotations_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let provider = Arc::new(ScriptedProvider::new(
            vec![too_many_requests()],
            Ok("ok".into()),
        ));
        let caller = caller(&["k1", "k2"], &provider);
        caller.complete("Tips?", None).await.unwrap();

        let output = handle.render();
        assert!(
            output.contains(r#"relay_upstream_attempts_total{outcome="rate_limited"} 1"#),
            "got: {output}"
        );
        assert!(
            output.contains(r#"relay_upstream_attempts_total{outcome="success"} 1"#),
            "got: {output}"
        );
        assert!(output.contains("relay_key_rotations_total 1"), "got: {output}");
    }
}
