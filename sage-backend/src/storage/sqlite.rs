use crate::error::AgentError;
use crate::storage::StorageAdapter;
use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

/// SQLite-backed conversation store. The whole history blob is upserted per
/// turn, mirroring the file adapter's full-overwrite contract.
pub struct SqliteStorageAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStorageAdapter {
    pub fn new(database_url: &str) -> Result<Self, AgentError> {
        // An in-memory database exists per connection, so the pool must not
        // fan out across connections in that case
        let (manager, max_size) = if database_url == ":memory:" {
            (SqliteConnectionManager::memory(), 1)
        } else {
            (SqliteConnectionManager::file(database_url), 4)
        };
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| AgentError::Persistence(format!("cannot open pool: {}", e)))?;

        let conn = pool
            .get()
            .map_err(|e| AgentError::Persistence(format!("cannot get connection: {}", e)))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_histories (
                session_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| AgentError::Persistence(format!("cannot create schema: {}", e)))?;

        Ok(SqliteStorageAdapter { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, AgentError> {
        self.pool
            .get()
            .map_err(|e| AgentError::Persistence(format!("cannot get connection: {}", e)))
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorageAdapter {
    async fn save(&self, session_id: &str, data: &str) -> Result<(), AgentError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO session_histories (session_id, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET data = ?2, updated_at = ?3",
            params![session_id, data, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AgentError::Persistence(format!("cannot save session: {}", e)))?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<String>, AgentError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT data FROM session_histories WHERE session_id = ?1")
            .map_err(|e| AgentError::Persistence(format!("cannot prepare query: {}", e)))?;
        let mut rows = stmt
            .query(params![session_id])
            .map_err(|e| AgentError::Persistence(format!("cannot query session: {}", e)))?;

        match rows.next() {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| AgentError::Persistence(format!("cannot read row: {}", e)))?;
                Ok(Some(data))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AgentError::Persistence(format!("cannot read session: {}", e))),
        }
    }
}
