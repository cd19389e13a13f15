//! Generative model provider abstraction.
//!
//! A provider performs exactly one upstream call; retries and backoff live in
//! [`crate::services::invoker`].

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use service_core::retry::Retryable;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Timed out after {0} seconds")]
    Timeout(u64),
}

impl ProviderError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::EmptyResponse => "empty_response",
            ProviderError::Timeout(_) => "timeout",
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::NotConfigured(_))
    }
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Generated text, if the model produced any.
    pub text: Option<String>,

    /// Model that served the request.
    pub model: String,

    /// Input tokens consumed.
    pub input_tokens: i32,

    /// Output tokens generated.
    pub output_tokens: i32,

    /// Finish reason.
    pub finish_reason: FinishReason,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    pub fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("STOP") | None => FinishReason::Complete,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST") => {
                FinishReason::ContentFilter
            }
            Some(_) => FinishReason::Other,
        }
    }
}

/// Image attached to a generation request, ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 (standard alphabet) encoded bytes.
    pub data: String,
}

/// Everything one upstream call needs.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Fixed persona/instructions sent as the system instruction.
    pub system_instruction: Option<String>,

    /// Composed user instruction.
    pub prompt: String,

    /// Optional image for vision analysis.
    pub image: Option<InlineImage>,

    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for text generation providers (e.g., Gemini).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Model that will serve `request`.
    fn model_for(&self, request: &GenerationRequest) -> &str;

    /// Perform a single generation call.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
