//! Facility ingest
//!
//! Raw records come from seed data, JSON files or the public update feed.
//! Every field is optional and loosely typed; [`normalize`] coerces a
//! record into a valid [`Facility`] instead of rejecting it, so a partially
//! filled record still shows up in the ranked list.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{
    Condition, Coordinate, Facility, FacilityStatus, FacilityType, Importance, PopulationLevel, SupplyLevel,
};

/// A facility as supplied from outside, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFacilityRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type", alias = "facility_type")]
    pub facility_type: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: Option<String>,
    pub condition: Option<String>,
    pub supply_level: Option<String>,
    pub population_level: Option<String>,
    pub importance: Option<String>,
    pub population_served: Option<i64>,
    pub urgency_hours: Option<f64>,
    pub effort_penalty: Option<f64>,
    pub cascade_prevention_count: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn finite_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(fallback)
}

/// Coerce a raw record into a facility with every field in range.
pub fn normalize(raw: RawFacilityRecord) -> Facility {
    let id = non_empty(&raw.id)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let name = non_empty(&raw.name).map(str::to_string).unwrap_or_else(|| id.clone());
    let facility_type = non_empty(&raw.facility_type)
        .map(FacilityType::parse_lenient)
        .unwrap_or(FacilityType::Other);
    let location = Coordinate::new(finite_or(raw.lat, 0.0), finite_or(raw.lng, 0.0));

    let mut facility = Facility::new(id, name, facility_type, location);

    facility.status = non_empty(&raw.status)
        .map(FacilityStatus::parse_lenient)
        .unwrap_or(FacilityStatus::Operational);
    facility.condition = non_empty(&raw.condition)
        .map(Condition::parse_lenient)
        .unwrap_or(Condition::Fair);
    facility.supply_level = non_empty(&raw.supply_level).map(SupplyLevel::parse_lenient);
    facility.importance = non_empty(&raw.importance).map(Importance::parse_lenient);
    facility.population_level = if facility_type.is_shelter_like() {
        non_empty(&raw.population_level).map(PopulationLevel::parse_lenient)
    } else {
        None
    };

    facility.population_served = raw.population_served.unwrap_or(0).max(0);
    facility.urgency_hours = finite_or(raw.urgency_hours, 0.0).max(0.0);
    facility.effort_penalty = match raw.effort_penalty {
        Some(effort) if effort.is_finite() && effort > 0.0 => effort,
        _ => 1.0,
    };
    facility.cascade_prevention_count = raw.cascade_prevention_count.unwrap_or(0).max(0);

    debug!(id = %facility.id, facility_type = %facility.facility_type, "Record normalized");
    facility
}

/// Read a JSON array of raw records from disk.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawFacilityRecord>, StorageError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[allow(clippy::too_many_arguments)]
fn seed(
    id: &str,
    name: &str,
    facility_type: &str,
    lat: f64,
    lng: f64,
    condition: &str,
    supply: &str,
    importance: &str,
) -> RawFacilityRecord {
    RawFacilityRecord {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        facility_type: Some(facility_type.to_string()),
        lat: Some(lat),
        lng: Some(lng),
        condition: Some(condition.to_string()),
        supply_level: Some(supply.to_string()),
        importance: Some(importance.to_string()),
        ..Default::default()
    }
}

/// Simulated field dataset around Khartoum and Omdurman.
pub fn seed_records() -> Vec<RawFacilityRecord> {
    let mut records = vec![
        seed("water-khartoum-north", "Khartoum North Pumping Station", "water", 15.6330, 32.5540, "fair", "medium", "very_important"),
        seed("water-omdurman", "Omdurman Water Treatment", "water", 15.6450, 32.4800, "poor", "low", "very_important"),
        seed("water-soba", "Soba Borehole Cluster", "water", 15.5020, 32.6350, "good", "high", "important"),
        seed("power-garri", "Garri Thermal Station", "power", 15.7830, 32.5420, "fair", "medium", "very_important"),
        seed("power-khartoum", "Khartoum Substation", "power", 15.5900, 32.5300, "bad", "very_low", "very_important"),
        seed("shelter-omdurman", "Omdurman Displacement Camp", "shelter", 15.6550, 32.4700, "poor", "low", "important"),
        seed("shelter-jabra", "Jabra School Shelter", "shelter", 15.5300, 32.5400, "fair", "medium", "important"),
        seed("food-souq", "Souq Arabi Food Distribution", "food", 15.6000, 32.5300, "good", "medium", "moderate"),
        seed("food-bahri", "Bahri Community Kitchen", "food", 15.6400, 32.5600, "poor", "low", "important"),
        seed("hospital-ibn-sina", "Ibn Sina Hospital", "hospital", 15.5700, 32.5200, "fair", "low", "very_important"),
        seed("hospital-omdurman", "Omdurman Teaching Hospital", "hospital", 15.6480, 32.4850, "poor", "very_low", "very_important"),
        // Outside the cascade radius of the city cluster
        seed("water-wad-madani", "Wad Madani Water Works", "water", 14.4010, 33.5190, "fair", "medium", "important"),
    ];

    for record in &mut records {
        match record.facility_type.as_deref() {
            Some("shelter") => {
                record.population_level = Some("very_high".to_string());
                record.urgency_hours = Some(24.0);
            }
            Some("hospital") => {
                record.population_level = Some("high".to_string());
                record.urgency_hours = Some(12.0);
            }
            Some("water") | Some("power") => {
                record.population_served = Some(120_000);
                record.urgency_hours = Some(48.0);
            }
            _ => {
                record.population_served = Some(8_000);
                record.urgency_hours = Some(72.0);
            }
        }
    }

    records
}
