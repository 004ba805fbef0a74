//! User report storage
//!
//! Reports are append-only; the only mutation is flipping `synced` once a
//! report has been reconciled into the online store.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::model::{Condition, Importance, PopulationLevel, SupplyLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: String,
    pub facility_id: String,
    pub condition: Option<Condition>,
    pub supply_level: Option<SupplyLevel>,
    pub population_level: Option<PopulationLevel>,
    pub importance: Option<Importance>,
    pub submitted_by: Option<String>,
    pub severity_score: f64,
    pub point_adjustment: f64,
    pub applied: bool,
    pub synced: bool,
    pub created_at: String,
}

impl ReportRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let condition: Option<String> = row.get("condition")?;
        let supply: Option<String> = row.get("supply_level")?;
        let population: Option<String> = row.get("population_level")?;
        let importance: Option<String> = row.get("importance")?;

        Ok(Self {
            id: row.get("id")?,
            facility_id: row.get("facility_id")?,
            condition: condition.as_deref().map(Condition::parse_lenient),
            supply_level: supply.as_deref().map(SupplyLevel::parse_lenient),
            population_level: population.as_deref().map(PopulationLevel::parse_lenient),
            importance: importance.as_deref().map(Importance::parse_lenient),
            submitted_by: row.get("submitted_by")?,
            severity_score: row.get("severity_score")?,
            point_adjustment: row.get("point_adjustment")?,
            applied: row.get("applied")?,
            synced: row.get("synced")?,
            created_at: row.get("created_at")?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, facility_id, condition, supply_level, population_level, importance,
    submitted_by, severity_score, point_adjustment, applied, synced, created_at";

pub fn insert_report(conn: &Connection, report: &ReportRow) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO user_reports (id, facility_id, condition, supply_level, population_level,
            importance, submitted_by, severity_score, point_adjustment, applied, synced, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            report.id,
            report.facility_id,
            report.condition.map(|c| c.as_str()),
            report.supply_level.map(|s| s.as_str()),
            report.population_level.map(|p| p.as_str()),
            report.importance.map(|i| i.as_str()),
            report.submitted_by,
            report.severity_score,
            report.point_adjustment,
            report.applied,
            report.synced,
            report.created_at,
        ],
    )?;
    Ok(())
}

/// Copy a report from another store; an existing id is left alone.
pub fn insert_report_if_absent(conn: &Connection, report: &ReportRow) -> Result<bool, StorageError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO user_reports (id, facility_id, condition, supply_level, population_level,
            importance, submitted_by, severity_score, point_adjustment, applied, synced, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        params![
            report.id,
            report.facility_id,
            report.condition.map(|c| c.as_str()),
            report.supply_level.map(|s| s.as_str()),
            report.population_level.map(|p| p.as_str()),
            report.importance.map(|i| i.as_str()),
            report.submitted_by,
            report.severity_score,
            report.point_adjustment,
            report.applied,
            report.created_at,
        ],
    )?;
    Ok(changed > 0)
}

/// Reports, newest first, optionally for one facility
pub fn list_reports(conn: &Connection, facility_id: Option<&str>) -> Result<Vec<ReportRow>, StorageError> {
    let mut results = Vec::new();

    match facility_id {
        Some(id) => {
            let sql = format!(
                "SELECT {} FROM user_reports WHERE facility_id = ? ORDER BY created_at DESC",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map(params![id], ReportRow::from_row)? {
                results.push(row?);
            }
        }
        None => {
            let sql = format!("SELECT {} FROM user_reports ORDER BY created_at DESC", SELECT_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map([], ReportRow::from_row)? {
                results.push(row?);
            }
        }
    }

    Ok(results)
}

pub fn list_unsynced(conn: &Connection) -> Result<Vec<ReportRow>, StorageError> {
    let sql = format!(
        "SELECT {} FROM user_reports WHERE synced = 0 ORDER BY created_at ASC",
        SELECT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut results = Vec::new();
    for row in stmt.query_map([], ReportRow::from_row)? {
        results.push(row?);
    }
    Ok(results)
}

/// Mark every queued report as synced; returns how many were flipped
pub fn mark_all_synced(conn: &Connection) -> Result<usize, StorageError> {
    Ok(conn.execute("UPDATE user_reports SET synced = 1 WHERE synced = 0", [])?)
}
