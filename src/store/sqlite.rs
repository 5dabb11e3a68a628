use std::sync::Arc;

use super::{validate_session_id, SessionStore, StoreError};
use crate::db::{self, SharedDb};
use crate::models::{ConversationLogEntry, Turn, TurnRole};

/// Session history persisted in the `session_memory` and `conversation_log` tables.
pub struct SqliteSessionStore {
    db: Arc<SharedDb>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<SharedDb>) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        text: &str,
    ) -> Result<Turn, StoreError> {
        validate_session_id(session_id)?;
        let turn = Turn::new(session_id, role, text);
        db::insert_turn(&self.db.conn(), &turn)?;
        Ok(turn)
    }

    fn read_recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        Ok(db::get_recent_turns(&self.db.conn(), session_id, limit)?)
    }

    fn clear(&self, session_id: &str) -> Result<usize, StoreError> {
        let conn = self.db.conn();
        let removed = db::delete_session_turns(&conn, session_id)?;
        db::delete_conversation_log(&conn, session_id)?;
        Ok(removed)
    }

    fn session_count(&self) -> Result<usize, StoreError> {
        Ok(db::count_sessions(&self.db.conn())?)
    }

    fn record_log(&self, entry: &ConversationLogEntry) -> Result<(), StoreError> {
        db::insert_conversation_log(&self.db.conn(), entry)?;
        Ok(())
    }

    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        log: &ConversationLogEntry,
    ) -> Result<(), StoreError> {
        validate_session_id(session_id)?;
        let mut conn = self.db.conn();
        let tx = conn.transaction().map_err(db::DatabaseError::from)?;
        db::insert_turn(&tx, &Turn::new(session_id, TurnRole::User, user_text))?;
        db::insert_turn(&tx, &Turn::new(session_id, TurnRole::Assistant, assistant_text))?;
        db::insert_conversation_log(&tx, log)?;
        tx.commit().map_err(db::DatabaseError::from)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::models::DecisionMode;

    fn store() -> SqliteSessionStore {
        SqliteSessionStore::new(Arc::new(SharedDb::new(open_memory_database().unwrap())))
    }

    #[test]
    fn append_and_read_back() {
        let store = store();
        store.append_turn("s1", TurnRole::User, "火とは何か").unwrap();
        store.append_turn("s1", TurnRole::Assistant, "熱の状態です").unwrap();
        let turns = store.read_recent_turns("s1", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "火とは何か");
        assert_eq!(turns[1].role, TurnRole::Assistant);
        assert_eq!(store.backend(), "sqlite");
    }

    #[test]
    fn clear_also_drops_log_rows() {
        let db = Arc::new(SharedDb::new(open_memory_database().unwrap()));
        let store = SqliteSessionStore::new(db.clone());
        store.append_turn("s1", TurnRole::User, "x").unwrap();
        store
            .record_log(&ConversationLogEntry {
                session_id: "s1".into(),
                mode: DecisionMode::LlmChat,
                intent: "general".into(),
                route_reason: "general chat".into(),
                center_claim: String::new(),
                warnings: vec![],
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        assert_eq!(store.clear("s1").unwrap(), 1);
        assert!(db::get_conversation_log(&db.conn(), "s1", 5).unwrap().is_empty());
        assert_eq!(store.session_count().unwrap(), 0);
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenmon.db");
        {
            let store = SqliteSessionStore::new(Arc::new(SharedDb::new(open_database(&path).unwrap())));
            store.append_turn("s1", TurnRole::User, "残る").unwrap();
        }
        let store = SqliteSessionStore::new(Arc::new(SharedDb::new(open_database(&path).unwrap())));
        let turns = store.read_recent_turns("s1", 5).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "残る");
    }

    #[test]
    fn failed_exchange_rolls_back_turns() {
        let db = Arc::new(SharedDb::new(open_memory_database().unwrap()));
        let store = SqliteSessionStore::new(db.clone());
        let log = ConversationLogEntry {
            session_id: "s1".into(),
            mode: DecisionMode::Hybrid,
            intent: "domain".into(),
            route_reason: "domain".into(),
            center_claim: "躰は骨格".into(),
            warnings: vec![],
            created_at: chrono::Utc::now(),
        };
        store.append_exchange("s1", "躰とは", "骨格です", &log).unwrap();
        assert_eq!(store.read_recent_turns("s1", 10).unwrap().len(), 2);

        db.conn().execute("DROP TABLE conversation_log", []).unwrap();
        assert!(store.append_exchange("s1", "用とは", "働きです", &log).is_err());
        let turns = store.read_recent_turns("s1", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].text, "骨格です");
    }

}
