//! Cascade service - simulated outages and their resolution
//!
//! ## Status transitions
//!
//! ```text
//!  operational ──(admin fail)──────────▶ failed
//!  operational ──(failure within R)────▶ at_risk
//!  at_risk ─────(no failure within R)──▶ operational
//!  failed ──────(admin resolve)────────▶ operational
//! ```
//!
//! `failed` never moves to `at_risk`, and `at_risk` only returns to
//! `operational` through the re-scan. The failed and at-risk sets are not
//! cached anywhere: they are read from the store's `status` column at the
//! start of every operation.
//!
//! Status writes for the target facility go through
//! [`FacilityDb::write_status_verified`]. If verification is exhausted the
//! mismatch is logged and the operation continues with whatever the store
//! holds; the caller still gets a result.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::{failure_events, facilities, FacilityDb, FacilityQuery, VerifyPolicy};
use crate::error::StorageError;
use crate::geo::within_radius;
use crate::model::{Facility, FacilityStatus};

use super::events::{EngineEvent, EventBus};
use super::facility_service::rescore_facility;

/// Result of failing a facility
#[derive(Debug, Clone, Serialize)]
pub struct FailureOutcome {
    pub failed: Facility,
    /// Facilities moved from operational to at risk by this failure
    pub at_risk: Vec<Facility>,
    /// False when the failed status could not be confirmed by read-back
    pub verified: bool,
}

/// Result of resolving a failure
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub resolved: Facility,
    /// At-risk facilities returned to operational
    pub restored: Vec<Facility>,
    /// At-risk facilities still within range of another failure
    pub still_at_risk: Vec<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeSettings {
    pub radius_km: f64,
    pub verify: VerifyPolicy,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            radius_km: 50.0,
            verify: VerifyPolicy::default(),
        }
    }
}

pub struct CascadeService {
    settings: CascadeSettings,
    events: Arc<EventBus>,
}

impl CascadeService {
    pub fn new(settings: CascadeSettings, events: Arc<EventBus>) -> Self {
        Self { settings, events }
    }

    pub fn settings(&self) -> CascadeSettings {
        self.settings
    }

    /// Write a status with verification; exhaustion is logged, not returned.
    async fn write_target_status(
        &self,
        db: &FacilityDb,
        facility_id: &str,
        status: FacilityStatus,
    ) -> Result<bool, StorageError> {
        match db.write_status_verified(facility_id, status, self.settings.verify).await {
            Ok(_) => Ok(true),
            Err(StorageError::InconsistentWrite { attempts, .. }) => {
                warn!(
                    store = %db.kind(),
                    facility_id = %facility_id,
                    expected = %status,
                    attempts,
                    "Status write could not be verified, continuing with best-effort state"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn load_all(&self, db: &FacilityDb) -> Result<Vec<Facility>, StorageError> {
        db.read(|conn| facilities::list_facilities(conn, &FacilityQuery::all()))
    }

    fn rescore(&self, db: &FacilityDb, facility_id: &str) -> Result<Facility, StorageError> {
        db.with_conn(|conn| rescore_facility(conn, facility_id))?
            .ok_or_else(|| StorageError::NotFound(facility_id.to_string()))
    }

    /// Fail a facility and mark every non-failed facility within the
    /// cascade radius as at risk.
    pub async fn simulate_failure(&self, db: &FacilityDb, facility_id: &str) -> Result<FailureOutcome, StorageError> {
        let all = self.load_all(db)?;
        let target = all
            .iter()
            .find(|f| f.id == facility_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(facility_id.to_string()))?;

        let verified = self.write_target_status(db, facility_id, FacilityStatus::Failed).await?;

        // Already at-risk neighbours keep their status and are not reported again
        let candidates: Vec<&Facility> = all
            .iter()
            .filter(|f| f.id != facility_id)
            .filter(|f| f.status == FacilityStatus::Operational)
            .filter(|f| within_radius(&target.location, &f.location, self.settings.radius_km))
            .collect();

        // One at a time against the same store; each write re-checks that
        // the facility has not failed in the meantime.
        let mut marked = Vec::new();
        for candidate in candidates {
            if db.with_conn(|conn| facilities::mark_at_risk_unless_failed(conn, &candidate.id))? {
                marked.push(candidate.id.clone());
            }
        }

        let failed = self.rescore(db, facility_id)?;
        let mut at_risk = Vec::with_capacity(marked.len());
        for id in &marked {
            at_risk.push(self.rescore(db, id)?);
            self.events.emit(EngineEvent::FacilityAtRisk {
                id: id.clone(),
                caused_by: facility_id.to_string(),
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        if let Err(e) = db.with_conn(|conn| failure_events::open_event(conn, facility_id, marked.len(), &now)) {
            warn!(facility_id = %facility_id, error = %e, "Failed to record failure event");
        }

        info!(
            store = %db.kind(),
            facility_id = %facility_id,
            at_risk = marked.len(),
            verified,
            "Facility failed"
        );
        self.events.emit(EngineEvent::FacilityFailed {
            id: facility_id.to_string(),
            at_risk: marked,
        });

        Ok(FailureOutcome {
            failed,
            at_risk,
            verified,
        })
    }

    /// Return a failed facility to operational, then re-check every at-risk
    /// facility in the store against the failures that remain.
    ///
    /// A target that is not failed is left as it is; only the re-scan runs,
    /// so an at-risk target is restored only when no failure is in range.
    pub async fn resolve_failure(&self, db: &FacilityDb, facility_id: &str) -> Result<ResolutionOutcome, StorageError> {
        let current = db
            .read(|conn| facilities::get_status(conn, facility_id))?
            .ok_or_else(|| StorageError::NotFound(facility_id.to_string()))?;

        let was_failed = current == FacilityStatus::Failed;
        let verified = if was_failed {
            let verified = self.write_target_status(db, facility_id, FacilityStatus::Operational).await?;
            let now = chrono::Utc::now().to_rfc3339();
            if let Err(e) = db.with_conn(|conn| failure_events::resolve_events(conn, facility_id, &now)) {
                warn!(facility_id = %facility_id, error = %e, "Failed to close failure events");
            }
            verified
        } else {
            info!(facility_id = %facility_id, status = %current, "Facility is not failed, re-scanning only");
            true
        };

        // Global re-scan: at-risk status can have several independent causes.
        let all = self.load_all(db)?;
        let remaining_failures: Vec<&Facility> = all.iter().filter(|f| f.is_failed()).collect();

        let mut restored = Vec::new();
        let mut still_at_risk = Vec::new();
        for facility in all.iter().filter(|f| f.is_at_risk()) {
            let threatened = remaining_failures
                .iter()
                .any(|failed| within_radius(&failed.location, &facility.location, self.settings.radius_km));

            if threatened {
                still_at_risk.push(facility.id.clone());
                continue;
            }

            if db.with_conn(|conn| facilities::restore_if_at_risk(conn, &facility.id))? {
                restored.push(self.rescore(db, &facility.id)?);
                self.events.emit(EngineEvent::FacilityRestored {
                    id: facility.id.clone(),
                });
            }
        }

        let resolved = self.rescore(db, facility_id)?;

        info!(
            store = %db.kind(),
            facility_id = %facility_id,
            restored = restored.len(),
            still_at_risk = still_at_risk.len(),
            verified,
            "Failure resolved"
        );
        if was_failed {
            self.events.emit(EngineEvent::FacilityRestored {
                id: facility_id.to_string(),
            });
        }

        Ok(ResolutionOutcome {
            resolved,
            restored,
            still_at_risk,
            verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreKind;
    use crate::model::{Coordinate, FacilityType};
    use std::time::Duration;

    fn service() -> CascadeService {
        CascadeService::new(
            CascadeSettings {
                radius_km: 50.0,
                verify: VerifyPolicy {
                    attempts: 3,
                    delay: Duration::ZERO,
                },
            },
            Arc::new(EventBus::new()),
        )
    }

    fn store(records: &[(&str, FacilityType, f64, f64)]) -> FacilityDb {
        let db = FacilityDb::open_in_memory(StoreKind::Online).unwrap();
        db.with_conn(|conn| {
            for (id, facility_type, lat, lng) in records {
                let f = Facility::new(*id, *id, *facility_type, Coordinate::new(*lat, *lng));
                facilities::upsert_facility(conn, &f)?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    fn status(db: &FacilityDb, id: &str) -> FacilityStatus {
        db.with_conn(|conn| facilities::get_status(conn, id)).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_failure_marks_neighbours_only() {
        let db = store(&[
            ("p", FacilityType::Power, 15.50, 32.50),
            ("near", FacilityType::Shelter, 15.60, 32.50),
            // about 111 km away
            ("far", FacilityType::Shelter, 16.50, 32.50),
        ]);
        let outcome = service().simulate_failure(&db, "p").await.unwrap();

        assert!(outcome.verified);
        assert_eq!(outcome.failed.status, FacilityStatus::Failed);
        assert!(outcome.failed.intervention_score >= 1000.0);
        assert_eq!(outcome.at_risk.len(), 1);
        assert_eq!(outcome.at_risk[0].id, "near");
        assert!(outcome.at_risk[0].intervention_score >= 500.0);
        assert_eq!(status(&db, "far"), FacilityStatus::Operational);
    }

    #[tokio::test]
    async fn test_failed_neighbour_is_not_downgraded() {
        let db = store(&[
            ("a", FacilityType::Power, 15.50, 32.50),
            ("b", FacilityType::Water, 15.51, 32.50),
        ]);
        let svc = service();
        svc.simulate_failure(&db, "a").await.unwrap();
        assert_eq!(status(&db, "b"), FacilityStatus::AtRisk);

        let outcome = svc.simulate_failure(&db, "b").await.unwrap();
        assert!(outcome.at_risk.is_empty());
        assert_eq!(status(&db, "a"), FacilityStatus::Failed);
        assert_eq!(status(&db, "b"), FacilityStatus::Failed);
    }

    #[tokio::test]
    async fn test_resolution_respects_other_failures() {
        let db = store(&[
            ("p1", FacilityType::Power, 15.50, 32.50),
            ("p2", FacilityType::Power, 16.20, 32.50),
            // 11 km from p1, 67 km from p2
            ("s1", FacilityType::Shelter, 15.60, 32.50),
            // 44 km from p1, 33 km from p2
            ("s2", FacilityType::Shelter, 15.90, 32.50),
        ]);
        let svc = service();
        svc.simulate_failure(&db, "p1").await.unwrap();
        svc.simulate_failure(&db, "p2").await.unwrap();
        assert_eq!(status(&db, "s1"), FacilityStatus::AtRisk);
        assert_eq!(status(&db, "s2"), FacilityStatus::AtRisk);

        let outcome = svc.resolve_failure(&db, "p1").await.unwrap();
        assert_eq!(outcome.resolved.status, FacilityStatus::Operational);
        assert_eq!(status(&db, "s1"), FacilityStatus::Operational);
        assert_eq!(status(&db, "s2"), FacilityStatus::AtRisk);
        assert_eq!(outcome.still_at_risk, vec!["s2".to_string()]);

        svc.resolve_failure(&db, "p2").await.unwrap();
        assert_eq!(status(&db, "s2"), FacilityStatus::Operational);
    }

    #[tokio::test]
    async fn test_resolving_at_risk_facility_keeps_it_at_risk() {
        let db = store(&[
            ("p", FacilityType::Power, 15.50, 32.50),
            // about 1 km from p
            ("s", FacilityType::Shelter, 15.51, 32.50),
        ]);
        let svc = service();
        svc.simulate_failure(&db, "p").await.unwrap();

        let outcome = svc.resolve_failure(&db, "s").await.unwrap();
        assert_eq!(outcome.resolved.status, FacilityStatus::AtRisk);
        assert_eq!(outcome.still_at_risk, vec!["s".to_string()]);
        assert!(outcome.restored.is_empty());
        assert_eq!(status(&db, "p"), FacilityStatus::Failed);
        assert_eq!(status(&db, "s"), FacilityStatus::AtRisk);

        // Once p is resolved the shelter comes back with it
        svc.resolve_failure(&db, "p").await.unwrap();
        assert_eq!(status(&db, "s"), FacilityStatus::Operational);
    }

    #[tokio::test]
    async fn test_resolving_operational_facility_changes_nothing() {
        let db = store(&[
            ("p", FacilityType::Power, 15.50, 32.50),
            ("s", FacilityType::Shelter, 15.51, 32.50),
            // about 111 km from p
            ("far", FacilityType::Food, 16.50, 32.50),
        ]);
        let svc = service();
        svc.simulate_failure(&db, "p").await.unwrap();

        let outcome = svc.resolve_failure(&db, "far").await.unwrap();
        assert_eq!(outcome.resolved.status, FacilityStatus::Operational);
        assert_eq!(status(&db, "p"), FacilityStatus::Failed);
        assert_eq!(status(&db, "s"), FacilityStatus::AtRisk);
        assert_eq!(db.with_conn(|conn| failure_events::list_events(conn, true)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_failure_reports_only_new_at_risk() {
        let db = store(&[
            ("p1", FacilityType::Power, 15.50, 32.50),
            ("p2", FacilityType::Power, 15.80, 32.50),
            // within range of both
            ("shared", FacilityType::Shelter, 15.65, 32.50),
            // within range of p2 only
            ("north", FacilityType::Shelter, 16.05, 32.50),
        ]);
        let svc = service();
        let first = svc.simulate_failure(&db, "p1").await.unwrap();
        assert!(first.at_risk.iter().any(|f| f.id == "shared"));

        let second = svc.simulate_failure(&db, "p2").await.unwrap();
        let ids: Vec<&str> = second.at_risk.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["north"]);
        assert_eq!(status(&db, "shared"), FacilityStatus::AtRisk);

        let open = db.with_conn(|conn| failure_events::list_events(conn, true)).unwrap();
        let p2_event = open.iter().find(|e| e.facility_id == "p2").unwrap();
        assert_eq!(p2_event.at_risk_count, 1);
    }

    #[tokio::test]
    async fn test_failure_events_recorded() {
        let db = store(&[
            ("p", FacilityType::Power, 15.50, 32.50),
            ("s", FacilityType::Shelter, 15.51, 32.50),
        ]);
        let svc = service();
        svc.simulate_failure(&db, "p").await.unwrap();
        let open = db.with_conn(|conn| failure_events::list_events(conn, true)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].at_risk_count, 1);

        svc.resolve_failure(&db, "p").await.unwrap();
        assert!(db.with_conn(|conn| failure_events::list_events(conn, true)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unverifiable_write_is_best_effort() {
        let db = store(&[
            ("p", FacilityType::Power, 15.50, 32.50),
            ("s", FacilityType::Shelter, 15.51, 32.50),
        ]);
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER block_failed AFTER UPDATE OF status ON facilities
                 WHEN NEW.status = 'failed'
                 BEGIN UPDATE facilities SET status = OLD.status WHERE id = NEW.id; END;",
            )?;
            Ok(())
        })
        .unwrap();

        let outcome = service().simulate_failure(&db, "p").await.unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.failed.status, FacilityStatus::Operational);
        // The cascade still ran
        assert_eq!(status(&db, "s"), FacilityStatus::AtRisk);
    }

    #[tokio::test]
    async fn test_unknown_facility() {
        let db = store(&[]);
        let svc = service();
        assert!(matches!(svc.simulate_failure(&db, "x").await, Err(StorageError::NotFound(_))));
        assert!(matches!(svc.resolve_failure(&db, "x").await, Err(StorageError::NotFound(_))));
    }
}
