//! Dependency edge storage
//!
//! Edges point from a dependent facility to the provider it relies on.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StorageError;
use crate::model::DependencyType;

/// Dependency row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRow {
    pub dependent_id: String,
    pub provider_id: String,
    pub dependency_type: DependencyType,
    pub distance_km: Option<f64>,
}

impl DependencyRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let dependency_type: String = row.get("dependency_type")?;
        Ok(Self {
            dependent_id: row.get("dependent_id")?,
            provider_id: row.get("provider_id")?,
            dependency_type: DependencyType::parse_lenient(&dependency_type),
            distance_km: row.get("distance_km")?,
        })
    }
}

/// List all edges in insertion order
pub fn list_dependencies(conn: &Connection) -> Result<Vec<DependencyRow>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT dependent_id, provider_id, dependency_type, distance_km
         FROM dependencies ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], DependencyRow::from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Insert an edge unless the pair is already linked in either direction.
/// Returns whether a row was written.
pub fn insert_dependency(conn: &Connection, edge: &DependencyRow) -> Result<bool, StorageError> {
    if edge.dependent_id == edge.provider_id {
        return Err(StorageError::InvalidInput(format!(
            "Facility {} cannot depend on itself",
            edge.dependent_id
        )));
    }

    let rows = conn.execute(
        "INSERT INTO dependencies (dependent_id, provider_id, dependency_type, distance_km)
         SELECT ?1, ?2, ?3, ?4
         WHERE NOT EXISTS (
            SELECT 1 FROM dependencies
            WHERE (dependent_id = ?1 AND provider_id = ?2)
               OR (dependent_id = ?2 AND provider_id = ?1)
         )",
        params![
            edge.dependent_id,
            edge.provider_id,
            edge.dependency_type.as_str(),
            edge.distance_km,
        ],
    )?;
    Ok(rows > 0)
}

pub fn delete_all_dependencies(conn: &Connection) -> Result<usize, StorageError> {
    Ok(conn.execute("DELETE FROM dependencies", [])?)
}

/// Number of edges whose provider is the given facility
pub fn count_dependents(conn: &Connection, provider_id: &str) -> Result<usize, StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM dependencies WHERE provider_id = ?",
        params![provider_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Dependent counts for every provider that has at least one edge
pub fn dependent_counts(conn: &Connection) -> Result<HashMap<String, usize>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT provider_id, COUNT(*) FROM dependencies GROUP BY provider_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (provider_id, count) = row?;
        counts.insert(provider_id, count as usize);
    }
    Ok(counts)
}
