use crate::error::AgentError;
use crate::vector::VectorRetriever;
use std::sync::Arc;

/// Context key the long-term source publishes under
pub const LONG_TERM_CONTEXT_KEY: &str = "long_term_context";

/// How many past fragments a load pulls from the index
const TOP_K: usize = 4;

/// Long-term memory: owns no state of its own, queries the vector index for
/// semantically relevant past exchanges on load and writes each new exchange
/// back on save.
pub struct VectorMemory {
    retriever: Arc<dyn VectorRetriever>,
}

impl VectorMemory {
    pub fn new(retriever: Arc<dyn VectorRetriever>) -> Self {
        VectorMemory { retriever }
    }

    /// Top-K relevant fragments as one text block; a failed query is logged
    /// and the source degrades to no context for this turn.
    pub async fn load(&self, query: &str) -> Option<String> {
        match self.retriever.query(query, TOP_K).await {
            Ok(documents) if documents.is_empty() => None,
            Ok(documents) => Some(
                documents
                    .into_iter()
                    .map(|d| d.content)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Err(e) => {
                log::error!("[MEMORY] Long-term retrieval failed, skipping context: {}", e);
                None
            }
        }
    }

    /// Make this exchange retrievable for future turns
    pub async fn record(&self, input: &str, output: &str) -> Result<(), AgentError> {
        self.retriever
            .add(&format!("input: {}\noutput: {}", input, output))
            .await
    }
}
