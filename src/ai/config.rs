//! AI provider and generation configuration
//!
//! Provider settings (endpoint, API key, model) and the per-call options a
//! generation run is started with. Nothing here is cached process-wide: the
//! caller builds a config and hands it to each generation call.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Type of AI provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    DeepSeek,
    Ollama,
    LMStudio,
    VLLM,
    Custom,
}

impl ProviderType {
    /// Default API endpoint for this provider type, if it has one
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("https://api.openai.com/v1"),
            ProviderType::DeepSeek => Some("https://api.deepseek.com/v1"),
            ProviderType::Ollama => Some("http://localhost:11434"),
            ProviderType::LMStudio => Some("http://localhost:1234"),
            ProviderType::VLLM => Some("http://localhost:8000"),
            ProviderType::Custom => None,
        }
    }

    /// Cloud providers refuse requests without a key
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderType::OpenAI | ProviderType::DeepSeek)
    }

    /// Local servers expose their OpenAI-compatible API under /v1
    fn is_local(&self) -> bool {
        matches!(
            self,
            ProviderType::Ollama | ProviderType::LMStudio | ProviderType::VLLM
        )
    }
}

/// Configuration for a single AI provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Unique identifier for this provider config
    pub id: String,
    /// Display name
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model identifier sent with each request
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            provider_type: ProviderType::Custom,
            api_key: None,
            base_url: None,
            model: String::new(),
        }
    }
}

/// Environment variable names for API keys
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
/// Ollama URL for Ollama endpoints
pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
/// LM Studio URL for LM Studio endpoints
pub const ENV_LMSTUDIO_URL: &str = "LMSTUDIO_URL";
/// VLLM URL for VLLM endpoints
pub const ENV_VLLM_URL: &str = "VLLM_URL";

fn is_blank(value: &Option<String>) -> bool {
    value.as_ref().map(|v| v.is_empty()).unwrap_or(true)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl ProviderConfig {
    /// Check environment variables and populate a missing API key or base URL
    /// Returns true if any value was updated
    pub fn populate_from_env(&mut self) -> bool {
        let (var, is_key) = match self.provider_type {
            ProviderType::OpenAI => (ENV_OPENAI_API_KEY, true),
            ProviderType::DeepSeek => (ENV_DEEPSEEK_API_KEY, true),
            ProviderType::Ollama => (ENV_OLLAMA_URL, false),
            ProviderType::LMStudio => (ENV_LMSTUDIO_URL, false),
            ProviderType::VLLM => (ENV_VLLM_URL, false),
            ProviderType::Custom => return false,
        };

        let slot = if is_key {
            &mut self.api_key
        } else {
            &mut self.base_url
        };
        if !is_blank(slot) {
            return false;
        }

        match non_empty_env(var) {
            Some(value) => {
                *slot = Some(value);
                log::info!("Loaded {} for provider '{}' from environment", var, self.id);
                true
            }
            None => false,
        }
    }

    /// Resolve the base URL requests are sent to
    ///
    /// Falls back to the provider type's default and appends `/v1` for local
    /// OpenAI-compatible servers. Returns None for a custom provider with no URL.
    pub fn effective_base_url(&self) -> Option<String> {
        let base = self
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.provider_type.default_base_url())?;
        let base = base.trim_end_matches('/');

        if self.provider_type.is_local() && !base.ends_with("/v1") {
            Some(format!("{}/v1", base))
        } else {
            Some(base.to_string())
        }
    }
}

/// Options for a single generation call
///
/// Built by the caller and treated as immutable for the call's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Surface the model's reasoning in the live view and the finished note
    #[serde(default)]
    pub display_thinking_mode: bool,
    /// Upper bound on the whole streaming read, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            display_thinking_mode: false,
            timeout_ms: default_timeout_ms(),
            max_output_tokens: None,
            temperature: None,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
