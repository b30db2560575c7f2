//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a message history to an LLM and get a
//! response back. The run loop calls `complete()` without knowing which
//! backend is configured; plugins that need schema-validated output
//! (summarization, intent detection) call `structured()`.
//!
//! Retry/backoff and provider-specific wire formatting live in the
//! implementations, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The session messages, in strict chronological order
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message (content and/or tool calls)
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Provider-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Tokens the next request would carry forward — what context metering
    /// cares about.
    pub fn context_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A request for schema-validated structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// JSON Schema the response object must satisfy
    pub schema: serde_json::Value,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// The core Provider trait.
///
/// Failure modes the loop must handle: network/API errors (classified by
/// the implementation), and the distinguished insufficient-credits error,
/// which always propagates to the host as a typed error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Get a response object validated against a JSON schema, rather than
    /// free text. Default implementation reports lack of support.
    async fn structured(
        &self,
        _request: StructuredRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support structured output",
            self.name()
        )))
    }

    /// List available models for this provider.
    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
