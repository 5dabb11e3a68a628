use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{ConversationLogEntry, DecisionMode};

pub fn insert_conversation_log(
    conn: &Connection,
    entry: &ConversationLogEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversation_log
            (session_id, mode, intent, route_reason, center_claim, warnings, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.session_id,
            entry.mode.as_str(),
            entry.intent,
            entry.route_reason,
            entry.center_claim,
            serde_json::to_string(&entry.warnings)?,
            entry.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Most recent log rows for a session, newest first.
pub fn get_conversation_log(
    conn: &Connection,
    session_id: &str,
    limit: usize,
) -> Result<Vec<ConversationLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, mode, intent, route_reason, center_claim, warnings, created_at
         FROM conversation_log WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![session_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(session_id, mode, intent, route_reason, center_claim, warnings, created_at)| {
                Ok(ConversationLogEntry {
                    session_id,
                    mode: DecisionMode::from_str(&mode)?,
                    intent,
                    route_reason,
                    center_claim,
                    warnings: serde_json::from_str(&warnings)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            },
        )
        .collect()
}

pub fn delete_conversation_log(conn: &Connection, session_id: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM conversation_log WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn entry(session: &str, claim: &str) -> ConversationLogEntry {
        ConversationLogEntry {
            session_id: session.into(),
            mode: DecisionMode::Hybrid,
            intent: "domain".into(),
            route_reason: "domain keywords".into(),
            center_claim: claim.into(),
            warnings: vec!["VERIFIER: no evidence".into()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn log_rows_round_trip_newest_first() {
        let conn = open_memory_database().unwrap();
        insert_conversation_log(&conn, &entry("s", "first")).unwrap();
        insert_conversation_log(&conn, &entry("s", "second")).unwrap();

        let rows = get_conversation_log(&conn, "s", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].center_claim, "second");
        assert_eq!(rows[0].mode, DecisionMode::Hybrid);
        assert_eq!(rows[1].warnings, vec!["VERIFIER: no evidence".to_string()]);
    }

    #[test]
    fn delete_clears_session_rows() {
        let conn = open_memory_database().unwrap();
        insert_conversation_log(&conn, &entry("s", "a")).unwrap();
        insert_conversation_log(&conn, &entry("t", "b")).unwrap();
        assert_eq!(delete_conversation_log(&conn, "s").unwrap(), 1);
        assert!(get_conversation_log(&conn, "s", 10).unwrap().is_empty());
        assert_eq!(get_conversation_log(&conn, "t", 10).unwrap().len(), 1);
    }
}
