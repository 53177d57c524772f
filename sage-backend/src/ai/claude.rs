use crate::ai::types::{
    AiError, AiResponse, OutputContent, OutputSegment, ToolCall, ToolResponse,
};
use crate::ai::{CompletionModel, LlmOptions, Message, MessageRole, ToolHistoryEntry};
use crate::config::Config;
use crate::tools::types::ToolDefinition;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Base delay for exponential backoff between transient-failure retries
const BASE_DELAY_MS: u64 = 2000;

/// Anthropic Messages API client. The HTTP client is injected by the
/// composition root so connection pooling is shared without ambient globals.
pub struct ClaudeClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
    options: LlmOptions,
}

/// Content block in an outgoing tool-aware request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Message content is either a string or an array of content blocks
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: WireContent,
}

/// Tool definition in the Messages API format
#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: Vec<ResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl ClaudeClient {
    pub fn new(
        client: Client,
        api_key: &str,
        model: impl Into<String>,
        options: LlmOptions,
    ) -> Result<Self, AiError> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let auth_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| AiError::new(format!("Invalid API key format: {}", e)))?;
        auth_headers.insert("x-api-key", auth_value);
        auth_headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        Ok(Self {
            client,
            auth_headers,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            options,
        })
    }

    /// Build a client from process configuration, with optional per-request
    /// sampling overrides.
    pub fn from_config(
        client: Client,
        config: &Config,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<Self, AiError> {
        let options = LlmOptions {
            temperature: temperature.unwrap_or(config.llm_temperature),
            max_tokens: max_tokens.unwrap_or(config.llm_max_tokens),
            max_retries: config.llm_max_retries,
            timeout: Duration::from_secs(config.llm_timeout_secs),
        };
        Self::new(client, &config.anthropic_api_key, &config.model_name, options)
    }

    /// Split the system message out of the transcript (the Messages API takes
    /// it as a top-level field) and convert the rest to wire messages.
    fn split_system(messages: Vec<Message>) -> (Option<String>, Vec<WireMessage>) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut wire = Vec::new();
        for m in messages {
            if m.role == MessageRole::System {
                system_parts.push(m.content);
            } else {
                wire.push(WireMessage {
                    role: m.role.to_string(),
                    content: WireContent::Text(m.content),
                });
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, wire)
    }

    /// Convert tool history into alternating assistant tool_use / user
    /// tool_result message pairs.
    fn tool_history_messages(history: &[ToolHistoryEntry]) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        for entry in history {
            let tool_use_blocks: Vec<ContentBlock> = entry
                .tool_calls
                .iter()
                .map(|tc| ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.arguments.clone(),
                })
                .collect();
            messages.push(WireMessage {
                role: "assistant".to_string(),
                content: WireContent::Blocks(tool_use_blocks),
            });

            let result_blocks: Vec<ContentBlock> = entry
                .tool_responses
                .iter()
                .map(|tr: &ToolResponse| ContentBlock::ToolResult {
                    tool_use_id: tr.tool_call_id.clone(),
                    content: tr.content.clone(),
                    is_error: if tr.is_error { Some(true) } else { None },
                })
                .collect();
            messages.push(WireMessage {
                role: "user".to_string(),
                content: WireContent::Blocks(result_blocks),
            });
        }
        messages
    }

    /// POST the request, retrying transient failures (429 and 5xx) with
    /// exponential backoff up to `max_retries` attempts.
    async fn send_with_retries(&self, request: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        let max_retries = self.options.max_retries;
        let mut last_error: Option<AiError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay_ms = BASE_DELAY_MS * (1 << (attempt - 1));
                log::warn!(
                    "[CLAUDE] Retry attempt {}/{} after {}ms delay",
                    attempt,
                    max_retries,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request_result = self
                .client
                .post(&self.endpoint)
                .headers(self.auth_headers.clone())
                .timeout(self.options.timeout)
                .json(request)
                .send()
                .await;

            let response = match request_result {
                Ok(r) => r,
                Err(e) => {
                    let err = AiError::new(format!("Claude API request failed: {}", e));
                    if attempt < max_retries {
                        log::warn!(
                            "[CLAUDE] Request failed (attempt {}): {}, will retry",
                            attempt + 1,
                            e
                        );
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            let status_code = status.as_u16();
            let is_retryable = matches!(status_code, 429 | 502 | 503 | 504);

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();

                if is_retryable && attempt < max_retries {
                    log::warn!(
                        "[CLAUDE] Received retryable status {} (attempt {}), will retry",
                        status,
                        attempt + 1
                    );
                    last_error = Some(AiError::with_status(
                        format!("HTTP {}: {}", status, error_text),
                        status_code,
                    ));
                    continue;
                }

                let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
                    Ok(parsed) => format!("Claude API error: {}", parsed.error.message),
                    Err(_) => format!(
                        "Claude API returned error status: {}, body: {}",
                        status, error_text
                    ),
                };
                return Err(AiError::with_status(message, status_code));
            }

            return response
                .json()
                .await
                .map_err(|e| AiError::new(format!("Failed to parse Claude response: {}", e)));
        }

        Err(last_error.unwrap_or_else(|| AiError::new("Max retries exceeded")))
    }

    fn parse_response(response: CompletionResponse) -> AiResponse {
        let mut segments = Vec::new();
        let mut tool_calls = Vec::new();

        for content in response.content {
            match content.content_type.as_str() {
                "text" => {
                    if let Some(text) = content.text {
                        segments.push(OutputSegment {
                            text,
                            segment_type: "text".to_string(),
                        });
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name), Some(input)) =
                        (content.id, content.name, content.input)
                    {
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments: input,
                        });
                    }
                }
                _ => {}
            }
        }

        AiResponse {
            content: OutputContent::Segments(segments),
            tool_calls,
            stop_reason: response.stop_reason,
        }
    }
}

#[async_trait]
impl CompletionModel for ClaudeClient {
    async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        let (system, wire_messages) = Self::split_system(messages);

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: wire_messages,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            system,
            tools: None,
        };

        let response = self.send_with_retries(&request).await?;
        Ok(Self::parse_response(response).content.flatten())
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        let (system, mut wire_messages) = Self::split_system(messages);
        wire_messages.extend(Self::tool_history_messages(&tool_history));

        let wire_tools: Vec<WireTool> = tools
            .into_iter()
            .map(|t| WireTool {
                name: t.name,
                description: t.description,
                input_schema: serde_json::to_value(t.input_schema).unwrap_or_default(),
            })
            .collect();

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: wire_messages,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            system,
            tools: if wire_tools.is_empty() {
                None
            } else {
                Some(wire_tools)
            },
        };

        let response = self.send_with_retries(&request).await?;
        Ok(Self::parse_response(response))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_system_joins_multiple_system_messages() {
        let (system, wire) = ClaudeClient::split_system(vec![
            Message::system("You are helpful."),
            Message::system("Relevant past context:\nfacts"),
            Message::user("hi"),
        ]);
        let system = system.unwrap();
        assert!(system.contains("You are helpful."));
        assert!(system.contains("Relevant past context:"));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_parse_response_collects_segments_and_tool_calls() {
        let response = CompletionResponse {
            content: vec![
                ResponseContent {
                    content_type: "text".to_string(),
                    text: Some("Let me search. ".to_string()),
                    id: None,
                    name: None,
                    input: None,
                },
                ResponseContent {
                    content_type: "tool_use".to_string(),
                    text: None,
                    id: Some("toolu_1".to_string()),
                    name: Some("web_search".to_string()),
                    input: Some(serde_json::json!({"query": "rust"})),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
        };

        let parsed = ClaudeClient::parse_response(response);
        assert_eq!(parsed.content.flatten(), "Let me search. ");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "web_search");
    }

    #[test]
    fn test_tool_history_becomes_message_pairs() {
        let history = vec![ToolHistoryEntry::new(
            vec![ToolCall {
                id: "toolu_1".to_string(),
                name: "web_search".to_string(),
                arguments: serde_json::json!({"query": "rust"}),
            }],
            vec![ToolResponse::success(
                "toolu_1".to_string(),
                "results".to_string(),
            )],
        )];

        let messages = ClaudeClient::tool_history_messages(&history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(messages[1].role, "user");
    }
}
