use crate::ai::Message;
use crate::error::AgentError;
use crate::storage::StorageAdapter;
use parking_lot::Mutex;
use std::sync::Arc;

/// Context key the short-term buffer publishes under
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// Short-term memory: the ordered sequence of turns for one session, held as
/// alternating user/assistant messages. When wired to a storage adapter the
/// whole buffer is rewritten after every turn, so a reload replays the exact
/// turn order.
pub struct ConversationBuffer {
    session_id: Option<String>,
    storage: Option<Arc<dyn StorageAdapter>>,
    turns: Mutex<Vec<Message>>,
}

impl ConversationBuffer {
    /// An unpersisted buffer (history lives only for this agent instance)
    pub fn new() -> Self {
        ConversationBuffer {
            session_id: None,
            storage: None,
            turns: Mutex::new(Vec::new()),
        }
    }

    /// A persisted buffer, seeded from the adapter before the first turn.
    /// A failed or corrupt load is logged and degrades to an empty buffer —
    /// never a request failure.
    pub async fn with_persistence(session_id: String, storage: Arc<dyn StorageAdapter>) -> Self {
        let turns = match storage.load(&session_id).await {
            Ok(Some(blob)) => match serde_json::from_str::<Vec<Message>>(&blob) {
                Ok(messages) => {
                    log::debug!(
                        "[MEMORY] Seeded session '{}' with {} messages",
                        session_id,
                        messages.len()
                    );
                    messages
                }
                Err(e) => {
                    log::error!(
                        "[MEMORY] Corrupt history for session '{}', starting empty: {}",
                        session_id,
                        e
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!(
                    "[MEMORY] Failed to load session '{}', starting empty: {}",
                    session_id,
                    e
                );
                Vec::new()
            }
        };

        ConversationBuffer {
            session_id: Some(session_id),
            storage: Some(storage),
            turns: Mutex::new(turns),
        }
    }

    /// Snapshot of the buffered messages, in turn order
    pub fn messages(&self) -> Vec<Message> {
        self.turns.lock().clone()
    }

    /// Append one exchange and rewrite the persisted blob (the complete
    /// buffer, not a delta).
    pub async fn record(&self, input: &str, output: &str) -> Result<(), AgentError> {
        let snapshot = {
            let mut turns = self.turns.lock();
            turns.push(Message::user(input));
            turns.push(Message::assistant(output));
            turns.clone()
        };

        let (Some(session_id), Some(storage)) = (&self.session_id, &self.storage) else {
            return Ok(());
        };

        let blob = serde_json::to_string(&snapshot)
            .map_err(|e| AgentError::Persistence(format!("cannot serialize history: {}", e)))?;
        storage.save(session_id, &blob).await
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
