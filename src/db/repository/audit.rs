use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// A row destined for the audit_log table.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub timestamp: String,
    pub source: String,
    pub action: String,
    pub entity: String,
    pub session_id: Option<String>,
}

/// Insert a batch of audit entries into the audit_log table.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRow]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, source, action, entity, session_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for row in entries {
        stmt.execute(params![
            row.timestamp,
            row.source,
            row.action,
            row.entity,
            row.session_id
        ])?;
    }
    Ok(())
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}

pub fn count_audit_entries(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn row(ts: &str) -> AuditRow {
        AuditRow {
            timestamp: ts.into(),
            source: "api".into(),
            action: "POST".into(),
            entity: "/api/chat".into(),
            session_id: Some("s1".into()),
        }
    }

    #[test]
    fn batch_insert_and_count() {
        let conn = open_memory_database().unwrap();
        insert_audit_entries(&conn, &[row("2030-01-01 00:00:00"), row("2030-01-01 00:00:01")])
            .unwrap();
        assert_eq!(count_audit_entries(&conn).unwrap(), 2);
    }

    #[test]
    fn prune_removes_only_old_rows() {
        let conn = open_memory_database().unwrap();
        insert_audit_entries(&conn, &[row("2000-01-01 00:00:00"), row("2999-01-01 00:00:00")])
            .unwrap();
        assert_eq!(prune_audit_log(&conn, 30).unwrap(), 1);
        assert_eq!(count_audit_entries(&conn).unwrap(), 1);
    }
}
