//! Crowd report validation
//!
//! A report only moves a facility's ranking when it plausibly describes a
//! worse state than what is on file. Each dimension claiming a worse state
//! contributes `(reported_ordinal - current_ordinal) * weight` to a severity
//! score; equal or better claims contribute nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Facility, Importance, PopulationLevel, ReportInput, SupplyLevel};
use crate::scoring::{condition_multiplier, population_weight, supply_multiplier};

const CONDITION_WEIGHT: f64 = 3.0;
const SUPPLY_WEIGHT: f64 = 2.0;
const POPULATION_WEIGHT: f64 = 2.0;
const IMPORTANCE_WEIGHT: f64 = 1.5;

/// Outcome of validating one report against the facility on file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub should_apply: bool,
    pub point_adjustment: f64,
    pub severity_score: f64,
}

impl ValidationOutcome {
    fn rejected(severity_score: f64) -> Self {
        Self {
            should_apply: false,
            point_adjustment: 0.0,
            severity_score,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportValidator {
    /// Minimum severity for a report to be applied
    pub threshold: f64,
    /// Maximum adjustment a single report may contribute
    pub adjustment_cap: f64,
}

impl Default for ReportValidator {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            adjustment_cap: 50.0,
        }
    }
}

fn worsening(reported: u8, current: u8) -> f64 {
    (reported as f64 - current as f64).max(0.0)
}

impl ReportValidator {
    pub fn new(threshold: f64, adjustment_cap: f64) -> Self {
        Self {
            threshold,
            adjustment_cap,
        }
    }

    /// Validate a report. Pure: identical inputs give identical outcomes.
    pub fn validate(&self, report: &ReportInput, facility: &Facility) -> ValidationOutcome {
        let mut severity = 0.0;
        let mut bonus = 0.0;

        if let Some(reported) = report.condition {
            let current = facility.condition;
            if reported > current {
                severity += worsening(reported.ordinal(), current.ordinal()) * CONDITION_WEIGHT;
                bonus += (condition_multiplier(reported) - condition_multiplier(current)) * 5.0;
            }
        }

        if let Some(reported) = report.supply_level {
            let current = facility.supply_level.unwrap_or(SupplyLevel::Medium);
            if reported > current {
                severity += worsening(reported.ordinal(), current.ordinal()) * SUPPLY_WEIGHT;
                bonus += (supply_multiplier(reported) - supply_multiplier(current)) * 3.0;
            }
        }

        if facility.facility_type.is_shelter_like() {
            if let Some(reported) = report.population_level {
                let current = facility.population_level.unwrap_or(PopulationLevel::Medium);
                if reported > current {
                    severity += worsening(reported.ordinal(), current.ordinal()) * POPULATION_WEIGHT;
                    bonus += (population_weight(reported) - population_weight(current)) * 0.3;
                }
            }
        }

        if let Some(reported) = report.importance {
            let current = facility.importance.unwrap_or(Importance::Moderate);
            if reported > current {
                severity += worsening(reported.ordinal(), current.ordinal()) * IMPORTANCE_WEIGHT;
            }
        }

        if severity < self.threshold {
            debug!(
                facility_id = %facility.id,
                severity,
                threshold = self.threshold,
                "Report below severity threshold"
            );
            return ValidationOutcome::rejected(severity);
        }

        let adjustment = (severity * 2.0 + bonus).clamp(0.0, self.adjustment_cap);

        ValidationOutcome {
            should_apply: true,
            point_adjustment: adjustment,
            severity_score: severity,
        }
    }
}

/// Validate with the default threshold and cap.
pub fn validate(report: &ReportInput, facility: &Facility) -> ValidationOutcome {
    ReportValidator::default().validate(report, facility)
}
