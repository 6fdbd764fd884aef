//! Shared types for the completion transport
//!
//! Request, message and error types plus the decoded streaming event.

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

use crate::ai::config::GenerationConfig;

/// Errors that can occur while talking to a completion endpoint
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing API key")]
    MissingApiKey,
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Stream error: {0}")]
    StreamError(String),
}

/// Raw response body, chunk by chunk, as it comes off the wire
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send>>;

/// Role of a message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

/// A message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: MessageRole::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
        }
    }
}

/// System prompt for note generation
pub const NOTE_SYSTEM_PROMPT: &str = r#"You are a note-writing assistant for a sticky-note canvas.
Answer the user's request as a single, self-contained note.

GUIDELINES:
- Start with a short first line that works as the note's title
- Use Markdown for structure (headings, lists, emphasis) where it helps
- Be concise; a note should fit on a card
- Do not wrap the answer in code fences or JSON"#;

/// Request for a streaming chat completion
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model identifier (without provider prefix)
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Build the single-turn request used to generate one note
    pub fn for_note(model: &str, prompt: &str, config: &GenerationConfig) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(NOTE_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

/// One decoded `data:` event from a streaming completion
///
/// Both text fields are additive deltas. Either, both or neither may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaEvent {
    /// Answer-channel text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning-channel text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl DeltaEvent {
    pub fn content(delta: &str) -> Self {
        Self {
            content: Some(delta.to_string()),
            ..Default::default()
        }
    }

    pub fn reasoning(delta: &str) -> Self {
        Self {
            reasoning_content: Some(delta.to_string()),
            ..Default::default()
        }
    }
}
