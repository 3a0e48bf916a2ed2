//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// A scripted outcome for one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this content
    Content(String),
    /// Fail with HTTP 429
    RateLimited,
    /// Fail with a non-quota request error
    Failure(String),
    /// Wait this long, then return the fixed response
    Stall(Duration),
}

/// Mock backend for testing.
///
/// Plays back scripted outcomes in order, then falls back to the fixed
/// response content.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    script: Mutex<VecDeque<Scripted>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Queue a scripted outcome.
    pub fn then(self, outcome: Scripted) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// A backend that is always rate limited.
    pub fn rate_limited(model_id: impl Into<String>) -> Self {
        Self::new(model_id).with_available(false)
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Option<Scripted> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        // Unavailable mocks behave like a model whose quota is spent
        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::RateLimited { retry_after_ms: None });
        }

        let content = match self.next_outcome() {
            Some(Scripted::Content(content)) => content,
            Some(Scripted::RateLimited) => {
                return Err(LlmError::RateLimited { retry_after_ms: None })
            }
            Some(Scripted::Failure(message)) => return Err(LlmError::RequestFailed(message)),
            Some(Scripted::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                self.response_content.clone()
            }
            None => self.response_content.clone(),
        };

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();

        let completion_tokens = content.len() as u32 / 4;

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}
