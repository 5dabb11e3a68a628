use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Turn, TurnRole};

pub fn insert_turn(conn: &Connection, turn: &Turn) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO session_memory (session_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            turn.session_id,
            turn.role.as_str(),
            turn.text,
            turn.timestamp.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Last `limit` turns of a session, oldest first.
pub fn get_recent_turns(
    conn: &Connection,
    session_id: &str,
    limit: usize,
) -> Result<Vec<Turn>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, role, content, created_at FROM (
             SELECT id, session_id, role, content, created_at FROM session_memory
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
         ) ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map(params![session_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(session_id, role, text, created_at)| {
            Ok(Turn {
                session_id,
                role: TurnRole::from_str(&role)?,
                text,
                timestamp: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })
        .collect()
}

pub fn delete_session_turns(conn: &Connection, session_id: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM session_memory WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(deleted)
}

pub fn count_sessions(conn: &Connection) -> Result<usize, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(DISTINCT session_id) FROM session_memory",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count as usize)
}
