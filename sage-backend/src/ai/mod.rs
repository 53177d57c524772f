pub mod claude;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use claude::ClaudeClient;
pub use types::{AiError, AiResponse, OutputContent, ToolCall, ToolHistoryEntry, ToolResponse};

use crate::tools::types::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged transcript record. This is also the unit of the persisted
/// conversation blob (a JSON array of these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling and transport options recognized by completion clients
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Transport-level retry count for transient failures
    pub max_retries: u32,
    /// Per-call deadline
    pub timeout: Duration,
}

impl Default for LlmOptions {
    fn default() -> Self {
        LlmOptions {
            temperature: 0.7,
            max_tokens: 1024,
            max_retries: 3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// The reasoning capability: given a transcript (and optionally a tool set),
/// produce either a final answer or tool invocation requests. Transport
/// retries live behind this seam, not in the agent loop.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate a plain text completion
    async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError>;

    /// Generate a response with tool support. `tool_history` carries prior
    /// rounds of tool calls and results so the conversation can continue.
    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError>;

    /// Name of the underlying model, for response metadata
    fn model_name(&self) -> &str;
}
