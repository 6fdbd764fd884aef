//! Completion transport layer
//!
//! Talks to OpenAI-compatible chat-completion endpoints and decodes their
//! streaming bodies:
//! - OpenAI, DeepSeek (reasoning via `reasoning_content`)
//! - Ollama, LM Studio, VLLM (local, under /v1)
//! - Any custom OpenAI-compatible endpoint

mod openai;
pub mod sse;
mod types;

pub use openai::OpenAIClient;
pub use types::*;

use async_trait::async_trait;

use super::config::{ProviderConfig, ProviderType};

/// Trait for streaming completion transports
///
/// The generation engine only ever sees the raw response body, so any
/// implementation that yields the bytes of an OpenAI-style event stream will do.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send the request and return the response body as it streams in
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, LlmError>;
}

/// Create a transport for the given provider configuration
pub fn create_transport(
    provider: &ProviderConfig,
) -> Result<Box<dyn CompletionTransport>, LlmError> {
    let api_key = provider.api_key.clone().filter(|k| !k.is_empty());
    if provider.provider_type.requires_api_key() && api_key.is_none() {
        return Err(LlmError::MissingApiKey);
    }

    let base_url = provider.effective_base_url().ok_or_else(|| {
        LlmError::NotConfigured("Custom provider requires base_url".to_string())
    })?;

    log::debug!(
        "[CompletionTransport] Creating {:?} transport for provider '{}' at {}",
        provider.provider_type,
        provider.id,
        base_url
    );

    // Local servers ignore keys; only forward one if the user set it
    let api_key = match provider.provider_type {
        ProviderType::Ollama | ProviderType::LMStudio => None,
        _ => api_key,
    };

    Ok(Box::new(OpenAIClient::new(&base_url, api_key)?))
}
