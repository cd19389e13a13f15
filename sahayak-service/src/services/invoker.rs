//! Bounded-retry invocation of the generative model.

use crate::services::metrics;
use crate::services::providers::{GenerationRequest, ProviderError, TextProvider};
use service_core::error::AppError;
use service_core::retry::{retry_async, RetryConfig, RetryError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;

/// Successful generation.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Non-empty generated text.
    pub text: String,
    pub model: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("Content generation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: ProviderError,
    },
}

impl From<RetryError<ProviderError>> for InvokeError {
    fn from(err: RetryError<ProviderError>) -> Self {
        match err {
            RetryError::Permanent {
                error: ProviderError::NotConfigured(msg),
                ..
            } => InvokeError::NotConfigured(msg),
            RetryError::Permanent {
                attempts, error, ..
            } => InvokeError::Exhausted {
                attempts,
                last_error: error,
            },
            RetryError::Exhausted {
                attempts,
                last_error,
                ..
            } => InvokeError::Exhausted {
                attempts,
                last_error,
            },
        }
    }
}

impl From<InvokeError> for AppError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NotConfigured(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            exhausted @ InvokeError::Exhausted { .. } => {
                AppError::UpstreamError(exhausted.to_string())
            }
        }
    }
}

/// Wraps a [`TextProvider`] with per-attempt timeouts and exponential backoff.
///
/// An attempt fails on a provider error, a timeout, or a missing/blank text
/// payload. Only `NotConfigured` short-circuits the loop.
#[derive(Clone)]
pub struct ResilientInvoker {
    provider: Arc<dyn TextProvider>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("provider", &self.provider.name())
            .field("retry", &self.retry)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl ResilientInvoker {
    pub fn new(provider: Arc<dyn TextProvider>, retry: RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            provider,
            retry,
            attempt_timeout,
        }
    }

    pub async fn invoke(&self, request: &GenerationRequest) -> Result<Generation, InvokeError> {
        let provider = &self.provider;
        let attempt_timeout = self.attempt_timeout;
        let model = provider.model_for(request);

        let generation = retry_async(&self.retry, "generate_content", |attempt| async move {
            let started = Instant::now();
            let outcome = match timeout(attempt_timeout, provider.generate(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(attempt_timeout.as_secs())),
            };
            metrics::record_provider_latency(model, started.elapsed().as_secs_f64());

            match outcome {
                Ok(response) => {
                    metrics::record_tokens(model, response.input_tokens, response.output_tokens);
                    match response.text.filter(|text| !text.trim().is_empty()) {
                        Some(text) => {
                            metrics::record_provider_attempt(model, "success");
                            Ok(Generation {
                                text,
                                model: response.model,
                                attempts: attempt + 1,
                            })
                        }
                        None => {
                            metrics::record_provider_attempt(model, "empty");
                            Err(ProviderError::EmptyResponse)
                        }
                    }
                }
                Err(error) => {
                    metrics::record_provider_attempt(model, error.kind());
                    Err(error)
                }
            }
        })
        .await?;

        tracing::info!(
            model = %generation.model,
            attempts = generation.attempts,
            chars = generation.text.len(),
            "Generation completed"
        );

        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::{MockOutcome, MockTextProvider};
    use crate::services::providers::ProviderResponse;
    use async_trait::async_trait;

    const UNIT: Duration = Duration::from_secs(1);

    fn invoker(provider: Arc<dyn TextProvider>) -> ResilientInvoker {
        ResilientInvoker::new(
            provider,
            RetryConfig::exponential(3, UNIT),
            Duration::from_secs(30),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_upstream_makes_three_attempts_and_waits_three_units() {
        let provider = Arc::new(MockTextProvider::failing(
            ProviderError::NetworkError("connection refused".into()),
            10,
        ));
        let start = tokio::time::Instant::now();

        let err = invoker(provider.clone())
            .invoke(&GenerationRequest::new("teach fractions"))
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3);
        assert_eq!(start.elapsed(), 3 * UNIT);
        match err {
            InvokeError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(
                    last_error,
                    ProviderError::NetworkError("connection refused".into())
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_payload_on_final_attempt_is_a_failure() {
        let provider = Arc::new(MockTextProvider::scripted([
            MockOutcome::NoText,
            MockOutcome::Text("   ".into()),
            MockOutcome::Text(String::new()),
        ]));

        let err = invoker(provider.clone())
            .invoke(&GenerationRequest::new("x"))
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3);
        assert!(matches!(
            err,
            InvokeError::Exhausted {
                last_error: ProviderError::EmptyResponse,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let provider = Arc::new(MockTextProvider::scripted([
            MockOutcome::Fail(ProviderError::RateLimited),
            MockOutcome::Text("A lesson about fractions".into()),
        ]));
        let start = tokio::time::Instant::now();

        let generation = invoker(provider.clone())
            .invoke(&GenerationRequest::new("x"))
            .await
            .unwrap();

        assert_eq!(generation.text, "A lesson about fractions");
        assert_eq!(generation.attempts, 2);
        assert_eq!(start.elapsed(), UNIT);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_labelled_with_the_request_model() {
        metrics::init_metrics();
        let provider = Arc::new(MockTextProvider::scripted([
            MockOutcome::Fail(ProviderError::RateLimited),
            MockOutcome::Text("ok".into()),
        ]));

        invoker(provider)
            .invoke(&GenerationRequest::new("x"))
            .await
            .unwrap();

        let exported = metrics::get_metrics();
        assert!(exported.contains(r#"genai_provider_attempts_total{model="mock-model",outcome="rate_limited"}"#));
        assert!(exported.contains(r#"genai_provider_attempts_total{model="mock-model",outcome="success"}"#));
        assert!(!exported.contains(r#"model="mock","#));
        assert!(exported.contains(r#"genai_provider_latency_seconds_count{model="mock-model"}"#));
    }

    #[tokio::test]
    async fn missing_configuration_is_not_retried() {
        let provider = Arc::new(MockTextProvider::failing(
            ProviderError::NotConfigured("no key".into()),
            3,
        ));

        let err = invoker(provider.clone())
            .invoke(&GenerationRequest::new("x"))
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 1);
        assert!(matches!(err, InvokeError::NotConfigured(_)));
    }

    struct StalledProvider;

    #[async_trait]
    impl TextProvider for StalledProvider {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn model_for(&self, _request: &GenerationRequest) -> &str {
            "stalled-model"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::NetworkError("unreachable".into()))
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_attempt_is_bounded_by_the_timeout() {
        let invoker = ResilientInvoker::new(
            Arc::new(StalledProvider),
            RetryConfig::exponential(2, UNIT),
            Duration::from_secs(5),
        );
        let start = tokio::time::Instant::now();

        let err = invoker
            .invoke(&GenerationRequest::new("x"))
            .await
            .unwrap_err();

        // Two 5s attempts plus one 1s backoff.
        assert_eq!(start.elapsed(), Duration::from_secs(11));
        assert!(matches!(
            err,
            InvokeError::Exhausted {
                last_error: ProviderError::Timeout(5),
                ..
            }
        ));
    }

    #[test]
    fn errors_map_to_http_classes() {
        let config: AppError = InvokeError::NotConfigured("missing key".into()).into();
        assert!(matches!(config, AppError::ConfigError(_)));

        let upstream: AppError = InvokeError::Exhausted {
            attempts: 3,
            last_error: ProviderError::RateLimited,
        }
        .into();
        match upstream {
            AppError::UpstreamError(msg) => {
                assert_eq!(msg, "Content generation failed after 3 attempts: Rate limited")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
