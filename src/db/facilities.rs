//! Facilities CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;

use crate::error::StorageError;
use crate::model::{
    Condition, Coordinate, Facility, FacilityStatus, FacilityType, Importance, PopulationLevel,
    SupplyLevel,
};

/// Columns that may appear in a filter or ORDER BY clause
const QUERYABLE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "facility_type",
    "status",
    "condition",
    "supply_level",
    "population_level",
    "importance",
    "population_served",
    "urgency_hours",
    "intervention_score",
    "updated_at",
];

const SELECT_COLUMNS: &str = "id, name, facility_type, lat, lng, status, condition, supply_level,
    population_level, importance, population_served, urgency_hours, effort_penalty,
    cascade_prevention_count, intervention_score, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Select-all with an optional single-column equality filter and ordering
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FacilityQuery {
    pub filter_column: Option<String>,
    pub filter_value: Option<String>,
    pub order_by: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

impl FacilityQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: FacilityStatus) -> Self {
        Self {
            filter_column: Some("status".into()),
            filter_value: Some(status.as_str().into()),
            ..Default::default()
        }
    }

    pub fn by_score_desc() -> Self {
        Self {
            order_by: Some("intervention_score".into()),
            direction: SortDirection::Desc,
            ..Default::default()
        }
    }
}

fn check_column(column: &str) -> Result<&str, StorageError> {
    QUERYABLE_COLUMNS
        .iter()
        .find(|c| **c == column)
        .copied()
        .ok_or_else(|| StorageError::InvalidInput(format!("Unknown facility column: {}", column)))
}

fn facility_from_row(row: &Row) -> Result<Facility, rusqlite::Error> {
    let facility_type: String = row.get("facility_type")?;
    let status: String = row.get("status")?;
    let condition: String = row.get("condition")?;
    let supply: Option<String> = row.get("supply_level")?;
    let population: Option<String> = row.get("population_level")?;
    let importance: Option<String> = row.get("importance")?;

    Ok(Facility {
        id: row.get("id")?,
        name: row.get("name")?,
        facility_type: FacilityType::parse_lenient(&facility_type),
        location: Coordinate::new(row.get("lat")?, row.get("lng")?),
        status: FacilityStatus::parse_lenient(&status),
        condition: Condition::parse_lenient(&condition),
        supply_level: supply.as_deref().map(SupplyLevel::parse_lenient),
        population_level: population.as_deref().map(PopulationLevel::parse_lenient),
        importance: importance.as_deref().map(Importance::parse_lenient),
        population_served: row.get("population_served")?,
        urgency_hours: row.get("urgency_hours")?,
        effort_penalty: row.get("effort_penalty")?,
        cascade_prevention_count: row.get("cascade_prevention_count")?,
        intervention_score: row.get("intervention_score")?,
        updated_at: row.get("updated_at")?,
    })
}

/// List facilities
pub fn list_facilities(conn: &Connection, query: &FacilityQuery) -> Result<Vec<Facility>, StorageError> {
    let mut sql = format!("SELECT {} FROM facilities", SELECT_COLUMNS);
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let (Some(column), Some(value)) = (&query.filter_column, &query.filter_value) {
        let column = check_column(column)?;
        sql.push_str(&format!(" WHERE {} = ?", column));
        params_vec.push(Box::new(value.clone()));
    }

    if let Some(order_by) = &query.order_by {
        let column = check_column(order_by)?;
        sql.push_str(&format!(" ORDER BY {} {}, id ASC", column, query.direction.as_sql()));
    } else {
        sql.push_str(" ORDER BY rowid ASC");
    }

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), facility_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }

    Ok(results)
}

/// Get a facility by ID
pub fn get_facility(conn: &Connection, id: &str) -> Result<Option<Facility>, StorageError> {
    let sql = format!("SELECT {} FROM facilities WHERE id = ?", SELECT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], facility_from_row).optional()?)
}

/// Read back only the status column
pub fn get_status(conn: &Connection, id: &str) -> Result<Option<FacilityStatus>, StorageError> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM facilities WHERE id = ?", params![id], |row| row.get(0))
        .optional()?;
    Ok(status.as_deref().map(FacilityStatus::parse_lenient))
}

/// Insert or replace a facility record
pub fn upsert_facility(conn: &Connection, facility: &Facility) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO facilities (id, name, facility_type, lat, lng, status, condition, supply_level,
            population_level, importance, population_served, urgency_hours, effort_penalty,
            cascade_prevention_count, intervention_score, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            facility_type = excluded.facility_type,
            lat = excluded.lat,
            lng = excluded.lng,
            status = excluded.status,
            condition = excluded.condition,
            supply_level = excluded.supply_level,
            population_level = excluded.population_level,
            importance = excluded.importance,
            population_served = excluded.population_served,
            urgency_hours = excluded.urgency_hours,
            effort_penalty = excluded.effort_penalty,
            cascade_prevention_count = excluded.cascade_prevention_count,
            intervention_score = excluded.intervention_score,
            updated_at = excluded.updated_at",
        params![
            facility.id,
            facility.name,
            facility.facility_type.as_str(),
            facility.location.lat,
            facility.location.lng,
            facility.status.as_str(),
            facility.condition.as_str(),
            facility.supply_level.map(|s| s.as_str()),
            facility.population_level.map(|p| p.as_str()),
            facility.importance.map(|i| i.as_str()),
            facility.population_served,
            facility.urgency_hours,
            facility.effort_penalty,
            facility.cascade_prevention_count,
            facility.intervention_score,
            facility.updated_at,
        ],
    )?;
    Ok(())
}

/// Set status; returns the number of rows changed
pub fn update_status(conn: &Connection, id: &str, status: FacilityStatus) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "UPDATE facilities SET status = ?, updated_at = ? WHERE id = ?",
        params![status.as_str(), chrono::Utc::now().to_rfc3339(), id],
    )?)
}

/// Mark a facility at risk unless it has already failed.
/// Returns whether the row was changed.
pub fn mark_at_risk_unless_failed(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let rows = conn.execute(
        "UPDATE facilities SET status = 'at_risk', updated_at = ?
         WHERE id = ? AND status != 'failed'",
        params![chrono::Utc::now().to_rfc3339(), id],
    )?;
    Ok(rows > 0)
}

/// Return an at-risk facility to operational; other statuses are left alone.
pub fn restore_if_at_risk(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let rows = conn.execute(
        "UPDATE facilities SET status = 'operational', updated_at = ?
         WHERE id = ? AND status = 'at_risk'",
        params![chrono::Utc::now().to_rfc3339(), id],
    )?;
    Ok(rows > 0)
}

/// Set the persisted intervention score
pub fn update_score(conn: &Connection, id: &str, score: f64) -> Result<usize, StorageError> {
    Ok(conn.execute(
        "UPDATE facilities SET intervention_score = ? WHERE id = ?",
        params![score, id],
    )?)
}

pub fn count_facilities(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM facilities", [], |row| row.get(0))?)
}

pub fn delete_all_facilities(conn: &Connection) -> Result<usize, StorageError> {
    Ok(conn.execute("DELETE FROM facilities", [])?)
}
