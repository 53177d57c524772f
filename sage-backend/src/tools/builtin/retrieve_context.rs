//! Retrieval tool: lets the model pull relevant chunks from the vector index
//! mid-loop, independent of the long-term memory source.

use crate::tools::types::{PropertySchema, ToolDefinition, ToolInputSchema, ToolResult};
use crate::tools::Tool;
use crate::vector::VectorRetriever;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const TOP_K: usize = 3;

pub struct RetrieveContextTool {
    retriever: Arc<dyn VectorRetriever>,
    definition: ToolDefinition,
}

impl RetrieveContextTool {
    pub fn new(retriever: Arc<dyn VectorRetriever>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "query".to_string(),
            PropertySchema::string("What to look up in the document index."),
        );

        RetrieveContextTool {
            retriever,
            definition: ToolDefinition {
                name: "retrieve_context".to_string(),
                description: "Retrieve relevant context from the document index based on the query.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["query".to_string()],
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RetrieveParams {
    query: String,
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let params: RetrieveParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        let documents = match self.retriever.query(&params.query, TOP_K).await {
            Ok(docs) => docs,
            Err(e) => return ToolResult::error(format!("Retrieval failed: {}", e)),
        };

        if documents.is_empty() {
            return ToolResult::success(format!(
                "No relevant context found for '{}'.",
                params.query
            ));
        }

        let serialized = documents
            .iter()
            .map(|doc| {
                format!(
                    "Source: {}\nContent: {}",
                    doc.source.as_deref().unwrap_or("unknown"),
                    doc.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let artifact = serde_json::to_value(&documents).unwrap_or(Value::Null);
        ToolResult::success(serialized).with_artifact(artifact)
    }
}
