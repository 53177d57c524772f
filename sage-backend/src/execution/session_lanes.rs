//! Per-session request serialization.
//!
//! Conversation history is persisted as one full-buffer blob per session, so
//! two concurrent turns on the same session id would clobber each other's
//! writes. A lane is a one-permit semaphore per session id: turns for the
//! same session run sequentially, turns for different sessions stay
//! concurrent.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Holding a lane longer than this is logged as unusual
const LANE_HOLD_WARNING_SECS: u64 = 60;

/// Guard that releases the session lane when dropped
pub struct SessionLaneGuard {
    session_id: String,
    _permit: OwnedSemaphorePermit,
    acquired_at: Instant,
}

impl SessionLaneGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLaneGuard {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        if held.as_secs() > LANE_HOLD_WARNING_SECS {
            log::warn!(
                "[LANES] Session {} lane held for {} seconds (unusually long)",
                self.session_id,
                held.as_secs()
            );
        }
    }
}

/// Manages session lanes for turn serialization
pub struct SessionLaneManager {
    lanes: DashMap<String, Arc<Semaphore>>,
}

impl SessionLaneManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lanes: DashMap::new(),
        })
    }

    /// Acquire exclusive access for this session id, waiting behind any turn
    /// already in flight for it.
    pub async fn acquire(&self, session_id: &str) -> SessionLaneGuard {
        let semaphore = self
            .lanes
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        let permit = semaphore
            .acquire_owned()
            .await
            .expect("session lane semaphore closed");

        SessionLaneGuard {
            session_id: session_id.to_string(),
            _permit: permit,
            acquired_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_turns_are_serialized() {
        let lanes = SessionLaneManager::new();
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let lanes = lanes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _guard = lanes.acquire("s1").await;
                log.lock().push("first-start");
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().push("first-end");
            })
        };

        // Give the first task time to take the lane
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = {
            let lanes = lanes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _guard = lanes.acquire("s1").await;
                log.lock().push("second-start");
            })
        };

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["first-start", "first-end", "second-start"]
        );
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block_each_other() {
        let lanes = SessionLaneManager::new();
        let _guard_a = lanes.acquire("a").await;

        // Must not dead-wait behind session "a"
        let guard_b =
            tokio::time::timeout(Duration::from_millis(100), lanes.acquire("b")).await;
        assert!(guard_b.is_ok());
        assert_eq!(guard_b.unwrap().session_id(), "b");
    }
}
