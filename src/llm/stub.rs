//! Scripted provider for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

type Reply = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

pub(crate) struct StubLlm {
    reply: Box<Reply>,
    calls: AtomicUsize,
}

impl StubLlm {
    pub fn with<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
        })
    }

    /// Replies with a fixed text.
    pub fn fixed(text: &'static str) -> Arc<Self> {
        Self::with(move |_| Ok(text.to_string()))
    }

    /// Every call fails with an HTTP 500.
    pub fn failing() -> Arc<Self> {
        Self::with(|_| {
            Err(LlmError::Api {
                provider: "stub".into(),
                status: 500,
                body: "upstream exploded".into(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Text of the last user message.
pub(crate) fn prompt_of(request: &CompletionRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = (self.reply)(&request)?;
        Ok(CompletionResponse {
            content,
            input_tokens: 10,
            output_tokens: 20,
            finish_reason: FinishReason::Stop,
        })
    }
}
