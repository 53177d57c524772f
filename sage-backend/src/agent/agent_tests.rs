//! End-to-end tests for the agent loop: scripted model, real memory
//! composition, real file-backed persistence in a temp directory.

use crate::agent::{chat_agent, Agent};
use crate::ai::mock::MockAiClient;
use crate::ai::types::{AiResponse, OutputContent, OutputSegment, ToolCall};
use crate::ai::{Message, MessageRole};
use crate::error::AgentError;
use crate::memory::{ContextFragment, MemoryConfig, CHAT_HISTORY_KEY};
use crate::storage::{FileStorageAdapter, StorageAdapter};
use crate::tools::types::{PropertySchema, ToolDefinition, ToolInputSchema, ToolResult};
use crate::tools::Tool;
use crate::vector::{RetrievedDocument, VectorRetriever};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// A tool that answers with a canned string, for exercising the loop
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        let mut properties = HashMap::new();
        properties.insert("text".to_string(), PropertySchema::string("Text to echo"));
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echo the given text".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: vec!["text".to_string()],
            },
        }
    }

    async fn execute(&self, params: serde_json::Value) -> ToolResult {
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        ToolResult::success(format!("echo: {}", text))
    }
}

struct StaticRetriever {
    documents: Vec<RetrievedDocument>,
}

#[async_trait]
impl VectorRetriever for StaticRetriever {
    async fn query(&self, _text: &str, k: usize) -> Result<Vec<RetrievedDocument>, AgentError> {
        Ok(self.documents.iter().take(k).cloned().collect())
    }

    async fn add(&self, _text: &str) -> Result<(), AgentError> {
        Ok(())
    }
}

fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments: args,
    }
}

fn file_storage() -> (tempfile::TempDir, Arc<dyn StorageAdapter>) {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn StorageAdapter> = Arc::new(FileStorageAdapter::new(dir.path()).unwrap());
    (dir, storage)
}

// ============================================================================
// Scenario: fresh session, single turn — answer comes back and exactly one
// turn pair lands in persistence.
// ============================================================================

#[tokio::test]
async fn fresh_session_single_turn_persists_one_pair() {
    let (_dir, storage) = file_storage();
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::text(
        "Hi there! How can I help?",
    )]));

    let agent = chat_agent(
        mock.clone(),
        vec![],
        None,
        Some("fresh_session"),
        Some(storage.clone()),
        None,
    )
    .await;

    let result = agent.run("Hello").await.unwrap();
    assert!(!result.output.is_empty());

    let blob = storage.load("fresh_session").await.unwrap().unwrap();
    let messages: Vec<Message> = serde_json::from_str(&blob).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].content, "Hi there! How can I help?");
}

// ============================================================================
// Scenario: pre-seeded history — the buffer replays both prior turns, in
// order, before the first new turn runs.
// ============================================================================

#[tokio::test]
async fn preseeded_history_is_loaded_at_construction() {
    let (_dir, storage) = file_storage();
    let seeded = vec![
        Message::user("Previous question"),
        Message::assistant("Previous answer"),
    ];
    storage
        .save("seeded", &serde_json::to_string(&seeded).unwrap())
        .await
        .unwrap();

    let mock = Arc::new(MockAiClient::new(vec![AiResponse::text("ok")]));
    let agent = chat_agent(mock, vec![], None, Some("seeded"), Some(storage), None).await;

    let context = agent.load_memory("New question").await;
    match context.get(CHAT_HISTORY_KEY) {
        Some(ContextFragment::Messages(messages)) => {
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].content, "Previous question");
            assert_eq!(messages[1].content, "Previous answer");
        }
        _ => panic!("expected chat history fragment"),
    }
}

#[tokio::test]
async fn preseeded_history_reaches_the_model_transcript() {
    let (_dir, storage) = file_storage();
    let seeded = vec![
        Message::user("What is Rust?"),
        Message::assistant("A systems language."),
    ];
    storage
        .save("transcript", &serde_json::to_string(&seeded).unwrap())
        .await
        .unwrap();

    let mock = Arc::new(MockAiClient::new(vec![AiResponse::text("Continuing.")]));
    let agent = chat_agent(
        mock.clone(),
        vec![],
        None,
        Some("transcript"),
        Some(storage),
        None,
    )
    .await;
    agent.run("Tell me more").await.unwrap();

    let trace = mock.trace();
    let input = &trace[0].input_messages;
    // system prompt, two seeded turns, then the new user query
    assert_eq!(input.len(), 4);
    assert_eq!(input[1].content, "What is Rust?");
    assert_eq!(input[2].content, "A systems language.");
    assert_eq!(input[3].content, "Tell me more");
}

// ============================================================================
// Loop termination: a model that always asks for tools stops after exactly
// max_iterations round-trips and still returns without error.
// ============================================================================

#[tokio::test]
async fn iteration_budget_terminates_loop_after_exactly_two_round_trips() {
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::with_tools(
        "Thinking with tools...",
        vec![tool_call("echo", json!({"text": "again"}))],
    )]));

    let agent = Agent::new(mock.clone(), vec![Arc::new(EchoTool)], "system", 2);
    let result = agent.run("loop forever").await.unwrap();

    assert_eq!(mock.call_count(), 2);
    // The best partial answer is the last reasoning output
    assert_eq!(result.output, "Thinking with tools...");
    assert_eq!(result.intermediate_steps.len(), 2);
}

#[tokio::test]
async fn budget_exhaustion_with_no_text_returns_empty_string() {
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::with_tools(
        "",
        vec![tool_call("echo", json!({"text": "x"}))],
    )]));

    let agent = Agent::new(mock, vec![Arc::new(EchoTool)], "system", 1);
    let result = agent.run("q").await.unwrap();
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn budget_exhaustion_still_saves_the_turn() {
    let (_dir, storage) = file_storage();
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::with_tools(
        "partial",
        vec![tool_call("echo", json!({"text": "x"}))],
    )]));

    let agent = Agent::new(mock, vec![Arc::new(EchoTool)], "system", 1)
        .with_memory(
            MemoryConfig {
                short_term: true,
                vector_retriever: None,
            },
            Some("capped"),
            Some(storage.clone()),
        )
        .await;
    agent.run("q").await.unwrap();

    let blob = storage.load("capped").await.unwrap().unwrap();
    let messages: Vec<Message> = serde_json::from_str(&blob).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "partial");
}

// ============================================================================
// Tool round-trips: results are fed back and the final answer lands.
// ============================================================================

#[tokio::test]
async fn tool_results_feed_the_next_round_trip() {
    let mock = Arc::new(MockAiClient::new(vec![
        AiResponse::with_tools("", vec![tool_call("echo", json!({"text": "ping"}))]),
        AiResponse::text("The echo said: ping"),
    ]));

    let agent = Agent::new(mock.clone(), vec![Arc::new(EchoTool)], "system", 6);
    let result = agent.run("use the tool").await.unwrap();

    assert_eq!(result.output, "The echo said: ping");
    assert_eq!(result.intermediate_steps.len(), 1);
    assert_eq!(result.intermediate_steps[0].tool, "echo");
    assert_eq!(result.intermediate_steps[0].tool_output, "echo: ping");

    // Second round-trip carries the first round's tool history
    let trace = mock.trace();
    assert_eq!(trace.len(), 2);
    assert!(trace[0].input_tool_history.is_empty());
    assert_eq!(trace[1].input_tool_history.len(), 1);
    assert_eq!(
        trace[1].input_tool_history[0].tool_responses[0].content,
        "echo: ping"
    );
}

#[tokio::test]
async fn unknown_tool_becomes_error_response_not_failure() {
    let mock = Arc::new(MockAiClient::new(vec![
        AiResponse::with_tools("", vec![tool_call("missing_tool", json!({}))]),
        AiResponse::text("Recovered without that tool."),
    ]));

    let agent = Agent::new(mock.clone(), vec![Arc::new(EchoTool)], "system", 6);
    let result = agent.run("try something odd").await.unwrap();

    assert_eq!(result.output, "Recovered without that tool.");
    let trace = mock.trace();
    let response = &trace[1].input_tool_history[0].tool_responses[0];
    assert!(response.is_error);
    assert!(response.content.contains("Unknown tool"));
}

// ============================================================================
// Output normalization: a segmented final answer flattens for both the
// public output and the persisted turn.
// ============================================================================

#[tokio::test]
async fn segmented_output_flattens_everywhere() {
    let (_dir, storage) = file_storage();
    let segmented = AiResponse {
        content: OutputContent::Segments(vec![
            OutputSegment {
                text: "First part. ".to_string(),
                segment_type: "text".to_string(),
            },
            OutputSegment {
                text: "Second part.".to_string(),
                segment_type: "text".to_string(),
            },
        ]),
        tool_calls: vec![],
        stop_reason: Some("end_turn".to_string()),
    };
    let mock = Arc::new(MockAiClient::new(vec![segmented]));

    let agent = chat_agent(mock, vec![], None, Some("segments"), Some(storage.clone()), None).await;
    let result = agent.run("hello").await.unwrap();

    assert_eq!(result.output, "First part. Second part.");

    let blob = storage.load("segments").await.unwrap().unwrap();
    let messages: Vec<Message> = serde_json::from_str(&blob).unwrap();
    assert_eq!(messages[1].content, "First part. Second part.");
}

// ============================================================================
// Long-term context: the retrieved fragment is injected as a system block.
// ============================================================================

#[tokio::test]
async fn long_term_fragment_is_injected_as_system_context() {
    let retriever = Arc::new(StaticRetriever {
        documents: vec![RetrievedDocument {
            content: "input: favorite color\noutput: green".to_string(),
            source: None,
            score: None,
        }],
    });
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::text("Green, you said.")]));

    let agent = chat_agent(mock.clone(), vec![], Some(retriever), None, None, None).await;
    agent.run("what's my favorite color?").await.unwrap();

    let trace = mock.trace();
    let systems: Vec<&Message> = trace[0]
        .input_messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .collect();
    assert_eq!(systems.len(), 2);
    assert!(systems[1].content.starts_with("Relevant past context:"));
    assert!(systems[1].content.contains("favorite color"));
}

// ============================================================================
// Conversation continuity: two turns in one agent, then a reload.
// ============================================================================

#[tokio::test]
async fn multi_turn_session_resumes_where_it_left_off() {
    let (_dir, storage) = file_storage();

    {
        let mock = Arc::new(MockAiClient::new(vec![
            AiResponse::text("First response"),
            AiResponse::text("Second response"),
        ]));
        let agent = chat_agent(
            mock,
            vec![],
            None,
            Some("continuity"),
            Some(storage.clone()),
            None,
        )
        .await;
        assert_eq!(agent.run("Query 1").await.unwrap().output, "First response");
        assert_eq!(agent.run("Query 2").await.unwrap().output, "Second response");
    }

    // A brand-new agent over the same session sees all four messages
    let mock = Arc::new(MockAiClient::new(vec![AiResponse::text("resumed")]));
    let agent = chat_agent(mock, vec![], None, Some("continuity"), Some(storage), None).await;
    let context = agent.load_memory("Query 3").await;
    match context.get(CHAT_HISTORY_KEY) {
        Some(ContextFragment::Messages(messages)) => {
            assert_eq!(messages.len(), 4);
            assert_eq!(messages[0].content, "Query 1");
            assert_eq!(messages[3].content, "Second response");
        }
        _ => panic!("expected chat history fragment"),
    }
}
