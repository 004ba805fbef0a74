//! Report service - validates and stores crowd reports
//!
//! Every report is stored for audit. Only reports that pass validation
//! contribute an adjustment to the ledger; the facility record itself is
//! never modified by a report.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{facilities, reports, sync_status, FacilityDb, ReportRow, StoreKind};
use crate::error::StorageError;
use crate::ledger::AdjustmentLedger;
use crate::model::ReportInput;
use crate::validator::{ReportValidator, ValidationOutcome};

use super::events::{EngineEvent, EventBus};

/// Result of submitting a report
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub report: ReportRow,
    pub validation: ValidationOutcome,
    /// Facility's cumulative ledger adjustment after this report
    pub total_adjustment: f64,
}

pub struct ReportService {
    validator: ReportValidator,
    events: Arc<EventBus>,
}

impl ReportService {
    pub fn new(validator: ReportValidator, events: Arc<EventBus>) -> Self {
        Self { validator, events }
    }

    pub fn submit(
        &self,
        db: &FacilityDb,
        ledger: &AdjustmentLedger,
        facility_id: &str,
        input: &ReportInput,
    ) -> Result<ReportOutcome, StorageError> {
        let facility = db
            .read(|conn| facilities::get_facility(conn, facility_id))?
            .ok_or_else(|| StorageError::NotFound(facility_id.to_string()))?;

        let validation = self.validator.validate(input, &facility);

        let report = ReportRow {
            id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            condition: input.condition,
            supply_level: input.supply_level,
            population_level: input.population_level,
            importance: input.importance,
            submitted_by: input.submitted_by.clone(),
            severity_score: validation.severity_score,
            point_adjustment: validation.point_adjustment,
            applied: validation.should_apply,
            // Reports written offline wait for the next sync pass
            synced: db.kind() == StoreKind::Online,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        db.with_conn(|conn| reports::insert_report(conn, &report))?;

        if db.kind() == StoreKind::Offline {
            if let Err(e) = db.with_conn(|conn| sync_status::increment_pending(conn, "user_reports")) {
                warn!(error = %e, "Failed to bump pending report count");
            }
        }

        let total_adjustment = if validation.should_apply {
            let total = ledger.add_for_report(&report.id, facility_id, validation.point_adjustment);
            info!(
                facility_id = %facility_id,
                severity = validation.severity_score,
                adjustment = validation.point_adjustment,
                total,
                "Report applied"
            );
            total
        } else {
            debug!(facility_id = %facility_id, severity = validation.severity_score, "Report stored without effect");
            ledger.get(facility_id)
        };

        self.events.emit(EngineEvent::ReportStored {
            report_id: report.id.clone(),
            facility_id: facility_id.to_string(),
            applied: validation.should_apply,
            adjustment: validation.point_adjustment,
        });

        Ok(ReportOutcome {
            report,
            validation,
            total_adjustment,
        })
    }

    pub fn list(&self, db: &FacilityDb, facility_id: Option<&str>) -> Result<Vec<ReportRow>, StorageError> {
        db.read(|conn| reports::list_reports(conn, facility_id))
    }
}
