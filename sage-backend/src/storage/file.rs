use crate::error::AgentError;
use crate::storage::StorageAdapter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One JSON file per session under a configured directory.
pub struct FileStorageAdapter {
    dir: PathBuf,
}

impl FileStorageAdapter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| AgentError::Persistence(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(FileStorageAdapter { dir })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, AgentError> {
        // Session ids are client-supplied; keep them out of path syntax
        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || session_id.starts_with('.')
        {
            return Err(AgentError::Persistence(format!(
                "invalid session id '{}'",
                session_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }
}

#[async_trait]
impl StorageAdapter for FileStorageAdapter {
    async fn save(&self, session_id: &str, data: &str) -> Result<(), AgentError> {
        let path = self.path_for(session_id)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AgentError::Persistence(format!("cannot write {}: {}", path.display(), e)))
    }

    async fn load(&self, session_id: &str) -> Result<Option<String>, AgentError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::Persistence(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
