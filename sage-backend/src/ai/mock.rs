//! Scripted completion model for tests.
//!
//! Responses cycle, so a one-element script answers every call with the same
//! response. Each call (input transcript, tool history, tool names, output)
//! is recorded to a trace that tests can assert on.

use crate::ai::types::{AiError, AiResponse};
use crate::ai::{CompletionModel, Message, ToolHistoryEntry};
use crate::tools::types::ToolDefinition;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One recorded model invocation
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub iteration: usize,
    pub input_messages: Vec<Message>,
    pub input_tool_history: Vec<ToolHistoryEntry>,
    pub input_tools: Vec<String>,
    pub output: AiResponse,
}

pub struct MockAiClient {
    responses: Vec<AiResponse>,
    calls: AtomicUsize,
    trace: Mutex<Vec<TraceEntry>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<AiResponse>) -> Self {
        assert!(!responses.is_empty(), "mock needs at least one response");
        MockAiClient {
            responses,
            calls: AtomicUsize::new(0),
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace.lock().clone()
    }

    async fn next_response(
        &self,
        input_messages: Vec<Message>,
        input_tool_history: Vec<ToolHistoryEntry>,
        input_tools: Vec<String>,
    ) -> AiResponse {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.responses[index % self.responses.len()].clone();
        self.trace.lock().push(TraceEntry {
            iteration: index + 1,
            input_messages,
            input_tool_history,
            input_tools,
            output: response.clone(),
        });
        response
    }
}

#[async_trait]
impl CompletionModel for MockAiClient {
    async fn generate_text(&self, messages: Vec<Message>) -> Result<String, AiError> {
        let response = self.next_response(messages, vec![], vec![]).await;
        Ok(response.content.flatten())
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        let tool_names = tools.into_iter().map(|t| t.name).collect();
        Ok(self.next_response(messages, tool_history, tool_names).await)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_cycle() {
        let mock = MockAiClient::new(vec![
            AiResponse::text("Response 1"),
            AiResponse::text("Response 2"),
            AiResponse::text("Response 3"),
        ]);

        assert_eq!(
            mock.generate_text(vec![Message::user("q")]).await.unwrap(),
            "Response 1"
        );
        assert_eq!(
            mock.generate_text(vec![Message::user("q")]).await.unwrap(),
            "Response 2"
        );
        assert_eq!(
            mock.generate_text(vec![Message::user("q")]).await.unwrap(),
            "Response 3"
        );
        // Cycles back to the first response
        assert_eq!(
            mock.generate_text(vec![Message::user("q")]).await.unwrap(),
            "Response 1"
        );
        assert_eq!(mock.call_count(), 4);
    }
}
