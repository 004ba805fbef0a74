//! Intervention scoring
//!
//! Pure scoring of a facility's intervention urgency. Stage order matters:
//! additive terms for importance, people and urgency are amplified by the
//! condition, supply and effort multipliers before the cascade, status,
//! floor, type and dependency terms are applied.
//!
//! ```text
//! score = ((((importance + people + urgency) * condition * supply / effort)
//!           + cascade * 10) * status) + floor + type_bonus + dependents * 5
//! ```

use tracing::warn;

use crate::model::{
    Condition, Facility, FacilityStatus, FacilityType, Importance, PopulationLevel, SupplyLevel,
};

/// Urgency horizon: facilities this many hours or more from failure get no urgency points
pub const URGENCY_HORIZON_HOURS: f64 = 100.0;

pub fn importance_weight(importance: Option<Importance>) -> f64 {
    match importance {
        Some(Importance::VeryImportant) => 5.0,
        Some(Importance::Important) => 3.0,
        Some(Importance::Moderate) | None => 1.5,
        Some(Importance::NotImportant) => 0.5,
    }
}

pub fn population_weight(level: PopulationLevel) -> f64 {
    match level {
        PopulationLevel::VeryHigh => 50.0,
        PopulationLevel::High => 25.0,
        PopulationLevel::Medium => 10.0,
        PopulationLevel::Low => 5.0,
        PopulationLevel::VeryLow => 1.0,
    }
}

pub fn condition_multiplier(condition: Condition) -> f64 {
    match condition {
        Condition::Bad => 3.0,
        Condition::Poor => 2.0,
        Condition::Fair => 1.0,
        Condition::Good => 0.5,
        Condition::Excellent => 0.2,
    }
}

pub fn supply_multiplier(supply: SupplyLevel) -> f64 {
    match supply {
        SupplyLevel::VeryLow => 2.5,
        SupplyLevel::Low => 2.0,
        SupplyLevel::Medium => 1.0,
        SupplyLevel::High => 0.7,
        SupplyLevel::VeryHigh => 0.5,
    }
}

pub fn status_multiplier(status: FacilityStatus) -> f64 {
    match status {
        FacilityStatus::Failed => 10.0,
        FacilityStatus::AtRisk => 5.0,
        FacilityStatus::Operational => 1.0,
    }
}

/// Flat boost that ranks failed and at-risk facilities above every operational one
pub fn status_floor(status: FacilityStatus) -> f64 {
    match status {
        FacilityStatus::Failed => 1000.0,
        FacilityStatus::AtRisk => 500.0,
        FacilityStatus::Operational => 0.0,
    }
}

pub fn type_bonus(facility_type: FacilityType) -> f64 {
    match facility_type {
        FacilityType::Hospital => 25.0,
        FacilityType::Shelter => 20.0,
        FacilityType::Water => 15.0,
        FacilityType::Power => 12.0,
        FacilityType::Food => 10.0,
        FacilityType::Other => 0.0,
    }
}

/// Replace a non-finite input with a fallback, logging the substitution.
fn sanitize(value: f64, fallback: f64, field: &str, facility_id: &str) -> f64 {
    if value.is_finite() {
        value
    } else {
        warn!(facility_id = %facility_id, field, "Non-finite score input, using fallback");
        fallback
    }
}

/// Compute the intervention score for a facility.
///
/// `dependent_count` is the number of dependency edges whose provider is
/// this facility. The result is always finite and `>= 0`.
pub fn compute_score(facility: &Facility, dependent_count: usize) -> f64 {
    let id = facility.id.as_str();

    let mut score = importance_weight(facility.importance);

    if facility.facility_type.is_shelter_like() {
        if let Some(level) = facility.population_level {
            score += population_weight(level);
        }
    } else {
        let served = facility.population_served.max(0) as f64;
        score += served * 0.1;
    }

    let urgency = sanitize(facility.urgency_hours, 0.0, "urgency_hours", id);
    if urgency > 0.0 {
        score += (URGENCY_HORIZON_HOURS - urgency).max(0.0) * 0.5;
    }

    score *= condition_multiplier(facility.condition);

    if let Some(supply) = facility.supply_level {
        score *= supply_multiplier(supply);
    }

    let effort = sanitize(facility.effort_penalty, 1.0, "effort_penalty", id);
    let effort = if effort > 0.0 { effort } else { 1.0 };
    score *= 1.0 / effort;

    score += facility.cascade_prevention_count.max(0) as f64 * 10.0;

    score *= status_multiplier(facility.status);
    score += status_floor(facility.status);
    score += type_bonus(facility.facility_type);
    score += dependent_count as f64 * 5.0;

    if !score.is_finite() {
        warn!(facility_id = %id, "Score computed as non-finite, clamping to 0");
        return 0.0;
    }

    score.max(0.0)
}
