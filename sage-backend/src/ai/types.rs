use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Completion transport error with status code information
#[derive(Debug, Clone)]
pub struct AiError {
    /// Error message
    pub message: String,
    /// HTTP status code if available
    pub status_code: Option<u16>,
}

impl AiError {
    pub fn new(message: impl Into<String>) -> Self {
        AiError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        AiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this is a client error (4xx status code)
    pub fn is_client_error(&self) -> bool {
        self.status_code
            .map(|c| (400..500).contains(&c))
            .unwrap_or(false)
    }

    /// Check if this is a server error (5xx status code)
    pub fn is_server_error(&self) -> bool {
        self.status_code.map(|c| c >= 500).unwrap_or(false)
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AiError {}

/// Represents a tool call made by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Arguments to pass to the tool as JSON
    pub arguments: Value,
}

/// Represents the result of a tool execution to send back to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// ID of the tool call this responds to
    pub tool_call_id: String,
    /// Content of the tool response
    pub content: String,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
}

impl ToolResponse {
    pub fn success(tool_call_id: String, content: String) -> Self {
        ToolResponse {
            tool_call_id,
            content,
            is_error: false,
        }
    }

    pub fn error(tool_call_id: String, error: String) -> Self {
        ToolResponse {
            tool_call_id,
            content: error,
            is_error: true,
        }
    }
}

/// One round of tool calls and their responses, kept so the conversation can
/// be continued on the next round-trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    /// The tool calls made by the model
    pub tool_calls: Vec<ToolCall>,
    /// The responses from executing those tool calls
    pub tool_responses: Vec<ToolResponse>,
}

impl ToolHistoryEntry {
    pub fn new(tool_calls: Vec<ToolCall>, tool_responses: Vec<ToolResponse>) -> Self {
        ToolHistoryEntry {
            tool_calls,
            tool_responses,
        }
    }
}

/// One typed segment of a multi-part model output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSegment {
    pub text: String,
    #[serde(rename = "type", default)]
    pub segment_type: String,
}

/// Model output content — either a plain string or a sequence of typed
/// segments. Both shapes flatten to a single string before they are recorded
/// to memory or returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputContent {
    Segments(Vec<OutputSegment>),
    Text(String),
}

impl OutputContent {
    /// Concatenate segment texts into one string; plain text passes through.
    pub fn flatten(&self) -> String {
        match self {
            OutputContent::Text(text) => text.clone(),
            OutputContent::Segments(segments) => {
                segments.iter().map(|s| s.text.as_str()).collect()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OutputContent::Text(text) => text.is_empty(),
            OutputContent::Segments(segments) => segments.iter().all(|s| s.text.is_empty()),
        }
    }
}

impl Default for OutputContent {
    fn default() -> Self {
        OutputContent::Text(String::new())
    }
}

/// Unified model response that can contain both content and tool calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    /// Content of the response (may be empty if only tool calls)
    pub content: OutputContent,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason the model stopped generating
    pub stop_reason: Option<String>,
}

impl AiResponse {
    pub fn text(content: impl Into<String>) -> Self {
        AiResponse {
            content: OutputContent::Text(content.into()),
            tool_calls: vec![],
            stop_reason: Some("end_turn".to_string()),
        }
    }

    pub fn with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        AiResponse {
            content: OutputContent::Text(content.into()),
            tool_calls,
            stop_reason: Some("tool_use".to_string()),
        }
    }

    /// Check if the response contains tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
