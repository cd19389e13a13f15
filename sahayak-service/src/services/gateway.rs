//! Lazily-initialised access to the generative model.
//!
//! The upstream client is built once, on first use, from the configured
//! credential. A failed initialisation is not cached, so a credential
//! supplied later is picked up by the next request.

use crate::config::{SahayakConfig, API_KEY_ENV};
use crate::services::invoker::{Generation, ResilientInvoker};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::{GenerationRequest, TextProvider};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Where the API key comes from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Use this value only.
    Fixed(Option<Secret<String>>),
    /// Use the configured value, falling back to an environment variable
    /// read at initialisation time.
    ConfiguredOrEnv {
        configured: Option<Secret<String>>,
        var: &'static str,
    },
}

impl CredentialSource {
    pub fn resolve(&self) -> Option<Secret<String>> {
        let candidate = match self {
            CredentialSource::Fixed(value) => value.clone(),
            CredentialSource::ConfiguredOrEnv { configured, var } => configured
                .clone()
                .or_else(|| std::env::var(var).ok().map(Secret::new)),
        };
        candidate.filter(|key| !key.expose_secret().trim().is_empty())
    }
}

/// Upstream settings needed to build the client.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub api_base: String,
    pub text_model: String,
    pub vision_model: String,
    pub retry: RetryConfig,
    pub attempt_timeout: Duration,
}

impl GatewaySettings {
    pub fn from_config(config: &SahayakConfig) -> Self {
        Self {
            api_base: config.gemini.api_base.clone(),
            text_model: config.gemini.text_model.clone(),
            vision_model: config.gemini.vision_model.clone(),
            retry: RetryConfig::exponential(
                config.retry.max_attempts,
                config.retry.backoff_unit(),
            ),
            attempt_timeout: config.retry.attempt_timeout(),
        }
    }
}

pub struct ModelGateway {
    credential: CredentialSource,
    settings: GatewaySettings,
    invoker: OnceCell<ResilientInvoker>,
}

impl ModelGateway {
    pub fn new(credential: CredentialSource, settings: GatewaySettings) -> Self {
        Self {
            credential,
            settings,
            invoker: OnceCell::new(),
        }
    }

    pub fn from_config(config: &SahayakConfig) -> Self {
        Self::new(
            CredentialSource::ConfiguredOrEnv {
                configured: config.gemini.api_key.clone(),
                var: API_KEY_ENV,
            },
            GatewaySettings::from_config(config),
        )
    }

    /// A gateway that is already initialised with the given invoker.
    pub fn with_invoker(invoker: ResilientInvoker, settings: GatewaySettings) -> Self {
        Self {
            credential: CredentialSource::Fixed(None),
            settings,
            invoker: OnceCell::new_with(Some(invoker)),
        }
    }

    /// A gateway whose calls go to `provider`, using the configured retry policy.
    pub fn with_provider(provider: Arc<dyn TextProvider>, settings: GatewaySettings) -> Self {
        let invoker = ResilientInvoker::new(
            provider,
            settings.retry.clone(),
            settings.attempt_timeout,
        );
        Self::with_invoker(invoker, settings)
    }

    pub fn is_initialized(&self) -> bool {
        self.invoker.initialized()
    }

    /// Build the client if needed. Concurrent callers share one build.
    pub async fn ensure_initialized(&self) -> Result<&ResilientInvoker, AppError> {
        self.invoker
            .get_or_try_init(|| async { self.build_invoker() })
            .await
    }

    fn build_invoker(&self) -> Result<ResilientInvoker, AppError> {
        let api_key = self.credential.resolve().ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "Gemini API key not configured. Set {}",
                API_KEY_ENV
            ))
        })?;

        let provider = GeminiTextProvider::new(GeminiConfig {
            api_key,
            api_base: self.settings.api_base.clone(),
            text_model: self.settings.text_model.clone(),
            vision_model: self.settings.vision_model.clone(),
            timeout: self.settings.attempt_timeout,
        })
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize Gemini client");
            AppError::ServiceUnavailable(format!("Model client unavailable: {}", e))
        })?;

        tracing::info!(
            text_model = %self.settings.text_model,
            vision_model = %self.settings.vision_model,
            max_attempts = self.settings.retry.max_attempts,
            "Initialized Gemini client"
        );

        Ok(ResilientInvoker::new(
            Arc::new(provider),
            self.settings.retry.clone(),
            self.settings.attempt_timeout,
        ))
    }

    /// Initialise if needed, then run one bounded-retry generation.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation, AppError> {
        let invoker = self.ensure_initialized().await?;
        Ok(invoker.invoke(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockTextProvider;
    use crate::services::providers::ProviderError;

    fn settings() -> GatewaySettings {
        GatewaySettings {
            api_base: "http://127.0.0.1:9".to_string(),
            text_model: "text".to_string(),
            vision_model: "vision".to_string(),
            retry: RetryConfig::exponential(3, Duration::from_millis(1)),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let gateway = ModelGateway::new(CredentialSource::Fixed(None), settings());

        let err = gateway.ensure_initialized().await.unwrap_err();

        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("not configured"));
        assert!(!gateway.is_initialized());
    }

    #[tokio::test]
    async fn blank_credential_counts_as_missing() {
        let gateway = ModelGateway::new(
            CredentialSource::Fixed(Some(Secret::new("   ".to_string()))),
            settings(),
        );
        assert!(gateway.ensure_initialized().await.is_err());
    }

    #[tokio::test]
    async fn initialises_once_with_a_credential() {
        let gateway = ModelGateway::new(
            CredentialSource::Fixed(Some(Secret::new("test-key".to_string()))),
            settings(),
        );

        let first = gateway.ensure_initialized().await.unwrap() as *const ResilientInvoker;
        let second = gateway.ensure_initialized().await.unwrap() as *const ResilientInvoker;

        assert!(gateway.is_initialized());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn credential_supplied_later_is_picked_up() {
        const VAR: &str = "SAHAYAK_TEST_LATE_CREDENTIAL";
        std::env::remove_var(VAR);
        let gateway = ModelGateway::new(
            CredentialSource::ConfiguredOrEnv {
                configured: None,
                var: VAR,
            },
            settings(),
        );

        assert!(gateway.ensure_initialized().await.is_err());
        assert!(!gateway.is_initialized());

        std::env::set_var(VAR, "late-key");
        let result = gateway.ensure_initialized().await;
        std::env::remove_var(VAR);

        assert!(result.is_ok());
        assert!(gateway.is_initialized());
    }

    #[test]
    fn configured_value_wins_over_environment() {
        let source = CredentialSource::ConfiguredOrEnv {
            configured: Some(Secret::new("from-config".to_string())),
            var: "SAHAYAK_TEST_UNSET_CREDENTIAL",
        };
        let resolved = source.resolve().unwrap();
        assert_eq!(resolved.expose_secret(), "from-config");

        let empty = CredentialSource::ConfiguredOrEnv {
            configured: None,
            var: "SAHAYAK_TEST_UNSET_CREDENTIAL",
        };
        assert!(empty.resolve().is_none());
    }

    #[tokio::test]
    async fn generate_maps_exhaustion_to_upstream_error() {
        let provider = Arc::new(MockTextProvider::failing(ProviderError::RateLimited, 5));
        let gateway = ModelGateway::with_provider(provider.clone(), settings());

        let err = gateway
            .generate(&GenerationRequest::new("hello"))
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), 3);
        assert!(matches!(err, AppError::UpstreamError(_)));
    }
}
