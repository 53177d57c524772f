//! The agent loop controller: composed memory in, bounded tool-calling loop,
//! durable save out. One `Agent` lives for one request; anything that must
//! survive the request does so through the storage adapter.

#[cfg(test)]
mod agent_tests;

use crate::ai::types::{OutputContent, ToolCall, ToolResponse};
use crate::ai::{CompletionModel, Message, ToolHistoryEntry};
use crate::error::Result;
use crate::memory::{ComposedMemory, ContextFragment, MemoryConfig, CHAT_HISTORY_KEY, LONG_TERM_CONTEXT_KEY};
use crate::storage::StorageAdapter;
use crate::tools::types::ToolDefinition;
use crate::tools::Tool;
use crate::vector::VectorRetriever;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful chatbot :)\n\
You have access to web search tools. Use them to find accurate, up-to-date information if you want to.\n\
When you find relevant information, cite your sources.\n\
Have fun :)";

pub const RESEARCH_SYSTEM_PROMPT: &str = "You are a helpful research assistant.\n\
You have access to web search tools. Use them to find accurate, up-to-date information.\n\
When you find relevant information, cite your sources.\n\
Be thorough but concise in your research.\n\
Simple questions should beget simple results.";

const DEFAULT_CHAT_ITERATIONS: usize = 6;
const DEFAULT_RESEARCH_ITERATIONS: usize = 10;

/// One executed tool call, kept for callers that want the loop's working
#[derive(Debug, Clone, Serialize)]
pub struct IntermediateStep {
    pub tool: String,
    pub tool_input: Value,
    pub tool_output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    /// Always a string — multi-part model output is flattened, and an empty
    /// answer stays an empty string rather than an error
    pub output: String,
    pub intermediate_steps: Vec<IntermediateStep>,
}

pub struct Agent {
    llm: Arc<dyn CompletionModel>,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: String,
    memory: ComposedMemory,
    max_iterations: usize,
}

impl Agent {
    /// An agent with no memory sources. `tools` is the fixed ordered list
    /// presented to the model for the lifetime of this agent.
    pub fn new(
        llm: Arc<dyn CompletionModel>,
        tools: Vec<Arc<dyn Tool>>,
        system_prompt: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Agent {
            llm,
            tools,
            system_prompt: system_prompt.into(),
            memory: ComposedMemory::empty(),
            max_iterations,
        }
    }

    /// Attach composed memory. Seeds the short-term buffer from storage when
    /// a session id and adapter are both present.
    pub async fn with_memory(
        mut self,
        config: MemoryConfig,
        session_id: Option<&str>,
        storage: Option<Arc<dyn StorageAdapter>>,
    ) -> Self {
        self.memory = ComposedMemory::compose(config, session_id, storage).await;
        self
    }

    /// Expose the composed memory's load for callers that want to inspect
    /// context without running a turn.
    pub async fn load_memory(&self, query: &str) -> std::collections::HashMap<String, ContextFragment> {
        self.memory.load(query).await
    }

    /// Run one turn: compose context, drive the tool-calling loop up to the
    /// iteration budget, save the exchange, return the flattened output.
    pub async fn run(&self, query: &str) -> Result<AgentRunResult> {
        let context = self.memory.load(query).await;

        let mut messages = vec![Message::system(&self.system_prompt)];
        if let Some(ContextFragment::Text(fragment)) = context.get(LONG_TERM_CONTEXT_KEY) {
            messages.push(Message::system(format!(
                "Relevant past context:\n{}",
                fragment
            )));
        }
        if let Some(ContextFragment::Messages(history)) = context.get(CHAT_HISTORY_KEY) {
            messages.extend(history.iter().cloned());
        }
        messages.push(Message::user(query));

        let definitions: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.definition()).collect();

        let mut tool_history: Vec<ToolHistoryEntry> = Vec::new();
        let mut intermediate_steps: Vec<IntermediateStep> = Vec::new();
        let mut last_content: Option<OutputContent> = None;
        let mut iterations = 0usize;

        let final_content = loop {
            iterations += 1;
            if iterations > self.max_iterations {
                // Budget exhaustion is a normal terminal state: hand back the
                // best partial answer instead of raising
                log::warn!(
                    "[AGENT_LOOP] Iteration budget ({}) exhausted, returning last reasoning output",
                    self.max_iterations
                );
                break last_content.unwrap_or_default();
            }

            log::debug!("[AGENT_LOOP] Iteration {} starting", iterations);
            let response = self
                .llm
                .generate_with_tools(messages.clone(), tool_history.clone(), definitions.clone())
                .await?;

            if !response.has_tool_calls() {
                break response.content;
            }

            last_content = Some(response.content);
            let responses = self
                .execute_tool_calls(&response.tool_calls, &mut intermediate_steps)
                .await;
            tool_history.push(ToolHistoryEntry::new(response.tool_calls, responses));
        };

        // Save runs whether the loop finished or hit its budget
        self.memory.save(query, &final_content).await;

        Ok(AgentRunResult {
            output: final_content.flatten(),
            intermediate_steps,
        })
    }

    /// Execute the requested tools in order. A failing tool becomes an
    /// error-flagged response in the transcript for the model to react to.
    async fn execute_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        intermediate_steps: &mut Vec<IntermediateStep>,
    ) -> Vec<ToolResponse> {
        let mut responses = Vec::new();

        for call in tool_calls {
            let start = std::time::Instant::now();

            let result = match self.tools.iter().find(|t| t.name() == call.name) {
                Some(tool) => tool.execute(call.arguments.clone()).await,
                None => crate::tools::ToolResult::error(format!(
                    "Unknown tool '{}'. Available tools: {}",
                    call.name,
                    self.tools
                        .iter()
                        .map(|t| t.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            };

            log::info!(
                "[AGENT_LOOP] Tool '{}' executed in {}ms, success: {}",
                call.name,
                start.elapsed().as_millis(),
                result.success
            );

            intermediate_steps.push(IntermediateStep {
                tool: call.name.clone(),
                tool_input: call.arguments.clone(),
                tool_output: result.content.clone(),
            });

            responses.push(if result.success {
                ToolResponse::success(call.id.clone(), result.content)
            } else {
                ToolResponse::error(call.id.clone(), result.content)
            });
        }

        responses
    }
}

/// The conversational preset: short-term buffer (persisted when session
/// wiring is present) plus long-term retrieval when a retriever exists.
pub async fn chat_agent(
    llm: Arc<dyn CompletionModel>,
    tools: Vec<Arc<dyn Tool>>,
    retriever: Option<Arc<dyn VectorRetriever>>,
    session_id: Option<&str>,
    storage: Option<Arc<dyn StorageAdapter>>,
    max_iterations: Option<usize>,
) -> Agent {
    Agent::new(
        llm,
        tools,
        CHAT_SYSTEM_PROMPT,
        max_iterations.unwrap_or(DEFAULT_CHAT_ITERATIONS),
    )
    .with_memory(
        MemoryConfig {
            short_term: true,
            vector_retriever: retriever,
        },
        session_id,
        storage,
    )
    .await
}

/// The one-shot preset: no memory sources, a larger iteration budget.
pub fn research_agent(
    llm: Arc<dyn CompletionModel>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: Option<usize>,
) -> Agent {
    Agent::new(
        llm,
        tools,
        RESEARCH_SYSTEM_PROMPT,
        max_iterations.unwrap_or(DEFAULT_RESEARCH_ITERATIONS),
    )
}
