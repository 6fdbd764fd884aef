//! OpenAI-compatible completion transport
//!
//! This client works with:
//! - OpenAI API
//! - DeepSeek (reasoning models stream `reasoning_content`)
//! - Ollama (with /v1 compatibility)
//! - LM Studio
//! - VLLM
//! - Any OpenAI-compatible endpoint

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use super::{ByteStream, ChatMessage, ChatRequest, CompletionTransport, LlmError};

/// OpenAI-compatible streaming client
pub struct OpenAIClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAIClient {
    /// Create a new OpenAI-compatible client
    ///
    /// No client-level timeout is set: the generation call bounds the whole
    /// streaming read itself.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        let client = Client::builder().build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Build request headers
    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| LlmError::NotConfigured(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Convert our ChatMessage to OpenAI API format
    fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
        messages
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::convert_messages(&request.messages),
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }
}

#[async_trait]
impl CompletionTransport for OpenAIClient {
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!(
            "[OpenAIClient] POST {} (model={}, {} messages)",
            url,
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&Self::request_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status,
                message: error_text,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LlmError::from));
        Ok(Box::pin(stream))
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}
