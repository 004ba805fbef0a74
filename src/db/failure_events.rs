//! Failure event log
//!
//! One row per simulated outage, closed when the facility is resolved.

use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEventRow {
    pub id: String,
    pub facility_id: String,
    pub at_risk_count: i64,
    pub started_at: String,
    pub resolved_at: Option<String>,
}

pub fn open_event(
    conn: &Connection,
    facility_id: &str,
    at_risk_count: usize,
    started_at: &str,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO failure_events (id, facility_id, at_risk_count, started_at) VALUES (?, ?, ?, ?)",
        params![id, facility_id, at_risk_count as i64, started_at],
    )?;
    Ok(id)
}

/// Close every open event for a facility; returns how many were closed
pub fn resolve_events(conn: &Connection, facility_id: &str, resolved_at: &str) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "UPDATE failure_events SET resolved_at = ? WHERE facility_id = ? AND resolved_at IS NULL",
        params![resolved_at, facility_id],
    )?)
}

pub fn list_events(conn: &Connection, open_only: bool) -> Result<Vec<FailureEventRow>, StorageError> {
    let sql = if open_only {
        "SELECT id, facility_id, at_risk_count, started_at, resolved_at FROM failure_events
         WHERE resolved_at IS NULL ORDER BY started_at ASC"
    } else {
        "SELECT id, facility_id, at_risk_count, started_at, resolved_at FROM failure_events
         ORDER BY started_at ASC"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(FailureEventRow {
            id: row.get(0)?,
            facility_id: row.get(1)?,
            at_risk_count: row.get(2)?,
            started_at: row.get(3)?,
            resolved_at: row.get(4)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    #[test]
    fn test_open_and_resolve() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        open_event(&conn, "p1", 3, "2026-10-19T10:00:00Z").unwrap();
        open_event(&conn, "p2", 0, "2026-10-19T11:00:00Z").unwrap();
        assert_eq!(list_events(&conn, true).unwrap().len(), 2);

        assert_eq!(resolve_events(&conn, "p1", "2026-10-19T12:00:00Z").unwrap(), 1);
        let open = list_events(&conn, true).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].facility_id, "p2");

        let all = list_events(&conn, false).unwrap();
        assert_eq!(all[0].at_risk_count, 3);
        assert!(all[0].resolved_at.is_some());
    }
}
