//! Memory composition: zero or more memory sources combined behind one
//! load/save surface. Sources are a closed set of tagged variants selected by
//! an explicit configuration; which sources end up attached depends only on
//! which dependencies are present at construction.

pub mod buffer;
pub mod retrieval;

pub use buffer::{ConversationBuffer, CHAT_HISTORY_KEY};
pub use retrieval::{VectorMemory, LONG_TERM_CONTEXT_KEY};

use crate::ai::{Message, OutputContent};
use crate::storage::StorageAdapter;
use crate::vector::VectorRetriever;
use std::collections::HashMap;
use std::sync::Arc;

/// Which memory sources an agent gets. Defaults to none.
#[derive(Default)]
pub struct MemoryConfig {
    /// Attach the short-term turn buffer
    pub short_term: bool,
    /// Attach long-term semantic retrieval over this retriever
    pub vector_retriever: Option<Arc<dyn VectorRetriever>>,
}

/// One attached memory source
pub enum MemorySource {
    Buffer(ConversationBuffer),
    Vector(VectorMemory),
}

impl MemorySource {
    /// Fixed, unique context key this source publishes under
    pub fn context_key(&self) -> &'static str {
        match self {
            MemorySource::Buffer(_) => CHAT_HISTORY_KEY,
            MemorySource::Vector(_) => LONG_TERM_CONTEXT_KEY,
        }
    }
}

/// A context fragment is either ordered transcript messages (buffer) or a
/// free-text block (retrieval).
#[derive(Debug, Clone)]
pub enum ContextFragment {
    Messages(Vec<Message>),
    Text(String),
}

/// The ordered collection of active memory sources for one agent instance,
/// fixed at construction. Load returns the union of all sources' fragments;
/// save propagates to every source, best effort.
pub struct ComposedMemory {
    sources: Vec<MemorySource>,
}

impl ComposedMemory {
    /// An empty composition; load and save are no-ops.
    pub fn empty() -> Self {
        ComposedMemory { sources: Vec::new() }
    }

    /// Attach each configured source whose dependency is present. The
    /// short-term buffer is only persisted when both a session id and a
    /// storage adapter exist; otherwise it is in-process only.
    pub async fn compose(
        config: MemoryConfig,
        session_id: Option<&str>,
        storage: Option<Arc<dyn StorageAdapter>>,
    ) -> Self {
        let mut sources = Vec::new();

        if config.short_term {
            let buffer = match (session_id, storage) {
                (Some(id), Some(adapter)) => {
                    ConversationBuffer::with_persistence(id.to_string(), adapter).await
                }
                _ => ConversationBuffer::new(),
            };
            sources.push(MemorySource::Buffer(buffer));
        }

        if let Some(retriever) = config.vector_retriever {
            sources.push(MemorySource::Vector(VectorMemory::new(retriever)));
        }

        ComposedMemory { sources }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Gather every source's context fragment, keyed. Keys are unique by
    /// construction; a collision is logged and the first fragment wins
    /// rather than being silently overwritten.
    pub async fn load(&self, query: &str) -> HashMap<String, ContextFragment> {
        let mut context = HashMap::new();

        for source in &self.sources {
            let key = source.context_key();
            let fragment = match source {
                MemorySource::Buffer(buffer) => {
                    Some(ContextFragment::Messages(buffer.messages()))
                }
                MemorySource::Vector(vector) => {
                    vector.load(query).await.map(ContextFragment::Text)
                }
            };

            let Some(fragment) = fragment else { continue };
            if context.contains_key(key) {
                log::error!("[MEMORY] Duplicate context key '{}', keeping first fragment", key);
                continue;
            }
            context.insert(key.to_string(), fragment);
        }

        context
    }

    /// Record one exchange to every source. The model output is normalized
    /// to a single string before recording (it may arrive as typed
    /// segments). A failure in one source is logged and does not stop the
    /// others, and never propagates to the caller.
    pub async fn save(&self, input: &str, output: &OutputContent) {
        let output_text = output.flatten();

        for source in &self.sources {
            let result = match source {
                MemorySource::Buffer(buffer) => buffer.record(input, &output_text).await,
                MemorySource::Vector(vector) => vector.record(input, &output_text).await,
            };
            if let Err(e) = result {
                log::error!(
                    "[MEMORY] Failed to save turn to '{}' source: {}",
                    source.context_key(),
                    e
                );
            }
        }
    }
}
