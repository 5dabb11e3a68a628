//! Injected key-value and session-history stores.
//!
//! Every piece of shared per-session state (history, loop signatures, tone,
//! spiral depth, thread candidates) lives behind one of these traits so the
//! pipeline never reaches for a module-level map.

pub mod memory;
pub mod sqlite;

pub use memory::{MemorySessionStore, TtlStore};
pub use sqlite::SqliteSessionStore;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::{ConversationLogEntry, Turn, TurnRole};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid session id")]
    InvalidSessionId,
}

/// Keyed store with interior mutability, shared across request tasks.
pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn put(&self, key: &str, value: V);
    fn remove(&self, key: &str) -> Option<V>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered turn history per session plus the per-turn conversation log.
pub trait SessionStore: Send + Sync {
    fn append_turn(&self, session_id: &str, role: TurnRole, text: &str)
        -> Result<Turn, StoreError>;

    /// The last `limit` turns of the session, oldest first.
    fn read_recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError>;

    /// Drop the session's history and log. Returns the number of turns removed.
    fn clear(&self, session_id: &str) -> Result<usize, StoreError>;

    fn session_count(&self) -> Result<usize, StoreError>;

    fn record_log(&self, entry: &ConversationLogEntry) -> Result<(), StoreError>;

    /// Persist one chat exchange: the user turn, the assistant turn and the
    /// log row. Either all three are stored or none is.
    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        log: &ConversationLogEntry,
    ) -> Result<(), StoreError>;

    /// Short backend label for status and readiness output.
    fn backend(&self) -> &'static str;
}

pub(crate) fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() || session_id.chars().count() > 200 {
        return Err(StoreError::InvalidSessionId);
    }
    Ok(())
}
