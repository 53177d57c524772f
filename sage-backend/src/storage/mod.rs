pub mod file;
pub mod sqlite;

pub use file::FileStorageAdapter;
pub use sqlite::SqliteStorageAdapter;

use crate::error::AgentError;
use async_trait::async_trait;

/// Durable store for serialized conversation history, keyed by session id.
/// The blob is opaque here; only the short-term memory source knows its
/// layout.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save(&self, session_id: &str, data: &str) -> Result<(), AgentError>;

    async fn load(&self, session_id: &str) -> Result<Option<String>, AgentError>;
}
