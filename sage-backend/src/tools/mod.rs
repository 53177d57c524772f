pub mod builtin;
pub mod types;

pub use types::{PropertySchema, ToolDefinition, ToolInputSchema, ToolResult};

use crate::vector::VectorRetriever;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Trait that all tools must implement. The core treats tools as opaque
/// callables: it presents name and schema to the model and feeds the result
/// back into the transcript.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition for the model API
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given parameters
    async fn execute(&self, params: Value) -> ToolResult;

    /// Returns the tool's name
    fn name(&self) -> String {
        self.definition().name
    }
}

/// Build the default ordered tool set: web search, plus context retrieval
/// when a retriever is configured.
pub fn create_default_tools(
    http: &reqwest::Client,
    retriever: Option<Arc<dyn VectorRetriever>>,
) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> =
        vec![Arc::new(builtin::WebSearchTool::new(http.clone()))];
    if let Some(retriever) = retriever {
        tools.push(Arc::new(builtin::RetrieveContextTool::new(retriever)));
    }
    tools
}
