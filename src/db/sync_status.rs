//! Per-table sync bookkeeping

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatusRow {
    pub table_name: String,
    pub last_synced_at: Option<String>,
    pub pending_changes: i64,
}

pub fn get_sync_status(conn: &Connection, table_name: &str) -> Result<Option<SyncStatusRow>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT table_name, last_synced_at, pending_changes FROM sync_status WHERE table_name = ?",
            params![table_name],
            |row| {
                Ok(SyncStatusRow {
                    table_name: row.get(0)?,
                    last_synced_at: row.get(1)?,
                    pending_changes: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn list_sync_status(conn: &Connection) -> Result<Vec<SyncStatusRow>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT table_name, last_synced_at, pending_changes FROM sync_status ORDER BY table_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SyncStatusRow {
            table_name: row.get(0)?,
            last_synced_at: row.get(1)?,
            pending_changes: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Record a completed sync: timestamp now, nothing pending
pub fn mark_synced(conn: &Connection, table_name: &str, synced_at: &str) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "UPDATE sync_status SET last_synced_at = ?, pending_changes = 0 WHERE table_name = ?",
        params![synced_at, table_name],
    )?)
}

pub fn increment_pending(conn: &Connection, table_name: &str) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "UPDATE sync_status SET pending_changes = pending_changes + 1 WHERE table_name = ?",
        params![table_name],
    )?)
}
