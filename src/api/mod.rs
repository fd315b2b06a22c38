//! Outbound text-generation providers.

use async_trait::async_trait;
use thiserror::Error;

pub mod openai;

/// Sampling parameters forwarded with every completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: Some(0.8),
            max_tokens: Some(4096),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate_limited: {0}")]
    RateLimited(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("auth: {0}")]
    Auth(String),

    /// The provider answered but produced no text, typically a safety filter.
    #[error("empty_response: {0}")]
    EmptyResponse(String),

    #[error("http_{status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("malformed_response: {0}")]
    Malformed(String),
}

/// A single prompt-in, text-out call. Implementations must not retry
/// internally.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, ProviderError>;
}
