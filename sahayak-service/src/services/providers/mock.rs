//! Mock provider implementation for testing.

use super::{FinishReason, GenerationRequest, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const MOCK_MODEL: &str = "mock-model";

/// Scripted outcome for one call.
pub enum MockOutcome {
    /// Respond with this text (an empty string simulates a blank payload).
    Text(String),
    /// Respond with no text at all.
    NoText,
    Fail(ProviderError),
}

/// Mock text provider for testing.
///
/// Scripted outcomes are consumed in order; once the script runs out every
/// call echoes the prompt back.
#[derive(Default)]
pub struct MockTextProvider {
    script: Mutex<VecDeque<MockOutcome>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockTextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose calls all fail with the given error.
    pub fn failing(error: ProviderError, times: usize) -> Self {
        Self::scripted((0..times).map(|_| MockOutcome::Fail(error.clone())))
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self) -> Option<MockOutcome> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model_for(&self, _request: &GenerationRequest) -> &str {
        MOCK_MODEL
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let text = match self.next_outcome() {
            Some(MockOutcome::Text(text)) => Some(text),
            Some(MockOutcome::NoText) => None,
            Some(MockOutcome::Fail(error)) => return Err(error),
            None => Some(format!("Mock response for: {}", request.prompt)),
        };

        Ok(ProviderResponse {
            text,
            model: MOCK_MODEL.to_string(),
            input_tokens: request.prompt.len() as i32 / 4,
            output_tokens: 10,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
