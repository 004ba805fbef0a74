//! Database schema definitions
//!
//! The online and offline stores share this schema exactly.

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::StorageError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Tables tracked in `sync_status`, one row each
pub const SYNCED_TABLES: &[&str] = &[
    "facilities",
    "dependencies",
    "user_reports",
    "failure_events",
    "interventions",
    "facility_timers",
];

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    seed_sync_status(conn)?;

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| StorageError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| StorageError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| StorageError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(FACILITY_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create facility tables: {}", e)))?;

    conn.execute_batch(REPORTS_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create report tables: {}", e)))?;

    conn.execute_batch(AUXILIARY_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create auxiliary tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Ensure every tracked table has its `sync_status` row.
pub fn seed_sync_status(conn: &Connection) -> Result<(), StorageError> {
    for table in SYNCED_TABLES {
        conn.execute(
            "INSERT OR IGNORE INTO sync_status (table_name, last_synced_at, pending_changes)
             VALUES (?, NULL, 0)",
            params![table],
        ).map_err(|e| StorageError::Internal(format!("Failed to seed sync_status: {}", e)))?;
    }
    Ok(())
}

/// Delete every row of every data table and reset sync bookkeeping.
pub fn clear_all_tables(conn: &mut Connection) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    for table in SYNCED_TABLES {
        tx.execute(&format!("DELETE FROM {}", table), [])?;
    }
    tx.execute(
        "UPDATE sync_status SET last_synced_at = NULL, pending_changes = 0",
        [],
    )?;
    tx.commit()?;
    Ok(())
}

const FACILITY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facilities (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    facility_type TEXT NOT NULL,
    lat REAL NOT NULL,
    lng REAL NOT NULL,

    status TEXT NOT NULL DEFAULT 'operational',
    condition TEXT NOT NULL DEFAULT 'fair',
    supply_level TEXT,
    population_level TEXT,
    importance TEXT,

    population_served INTEGER NOT NULL DEFAULT 0,
    urgency_hours REAL NOT NULL DEFAULT 0,
    effort_penalty REAL NOT NULL DEFAULT 1.0,
    cascade_prevention_count INTEGER NOT NULL DEFAULT 0,

    -- Derived, persisted for fast listing
    intervention_score REAL NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- dependent relies on provider for power/water
CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dependent_id TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    dependency_type TEXT NOT NULL,
    distance_km REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (dependent_id, provider_id)
);

CREATE TABLE IF NOT EXISTS sync_status (
    table_name TEXT PRIMARY KEY NOT NULL,
    last_synced_at TEXT,
    pending_changes INTEGER NOT NULL DEFAULT 0
);
"#;

const REPORTS_SCHEMA: &str = r#"
-- Crowd reports, immutable once stored
CREATE TABLE IF NOT EXISTS user_reports (
    id TEXT PRIMARY KEY NOT NULL,
    facility_id TEXT NOT NULL,
    condition TEXT,
    supply_level TEXT,
    population_level TEXT,
    importance TEXT,
    submitted_by TEXT,
    severity_score REAL NOT NULL DEFAULT 0,
    point_adjustment REAL NOT NULL DEFAULT 0,
    applied INTEGER NOT NULL DEFAULT 0,
    synced INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const AUXILIARY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS failure_events (
    id TEXT PRIMARY KEY NOT NULL,
    facility_id TEXT NOT NULL,
    at_risk_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    resolved_at TEXT
);

CREATE TABLE IF NOT EXISTS interventions (
    id TEXT PRIMARY KEY NOT NULL,
    facility_id TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'planned',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS facility_timers (
    facility_id TEXT PRIMARY KEY NOT NULL,
    started_at TEXT NOT NULL,
    hours_remaining REAL NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_facilities_status ON facilities(status);
CREATE INDEX IF NOT EXISTS idx_facilities_type ON facilities(facility_type);
CREATE INDEX IF NOT EXISTS idx_facilities_score ON facilities(intervention_score);

CREATE INDEX IF NOT EXISTS idx_dependencies_provider ON dependencies(provider_id);

CREATE INDEX IF NOT EXISTS idx_reports_facility ON user_reports(facility_id);
CREATE INDEX IF NOT EXISTS idx_reports_synced ON user_reports(synced);

CREATE INDEX IF NOT EXISTS idx_failure_events_facility ON failure_events(facility_id);
"#;
