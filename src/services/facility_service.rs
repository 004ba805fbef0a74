//! Facility service - listing, ingest and score persistence

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{dependencies, facilities, FacilityDb, FacilityQuery};
use crate::error::StorageError;
use crate::ledger::AdjustmentLedger;
use crate::model::Facility;
use crate::scoring::compute_score;

use super::events::{EngineEvent, EventBus};

/// Recompute and persist one facility's score from its stored state.
///
/// Returns the updated record, or `None` if the facility does not exist.
pub fn rescore_facility(conn: &Connection, facility_id: &str) -> Result<Option<Facility>, StorageError> {
    let Some(mut facility) = facilities::get_facility(conn, facility_id)? else {
        return Ok(None);
    };
    let dependents = dependencies::count_dependents(conn, facility_id)?;
    let score = compute_score(&facility, dependents);
    facilities::update_score(conn, facility_id, score)?;
    facility.intervention_score = score;
    debug!(facility_id = %facility_id, status = %facility.status, score, "Score persisted");
    Ok(Some(facility))
}

pub struct FacilityService {
    events: Arc<EventBus>,
}

impl FacilityService {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self { events }
    }

    /// Facilities ranked by persisted score plus ledger adjustment, highest first.
    pub fn load(&self, db: &FacilityDb, ledger: &AdjustmentLedger) -> Result<Vec<Facility>, StorageError> {
        let mut all = db.read(|conn| facilities::list_facilities(conn, &FacilityQuery::all()))?;

        for facility in &mut all {
            facility.intervention_score += ledger.get(&facility.id);
        }

        all.sort_by(|a, b| {
            b.intervention_score
                .total_cmp(&a.intervention_score)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(all)
    }

    pub fn get(&self, db: &FacilityDb, facility_id: &str) -> Result<Facility, StorageError> {
        db.read(|conn| facilities::get_facility(conn, facility_id))?
            .ok_or_else(|| StorageError::NotFound(facility_id.to_string()))
    }

    /// Store normalized facilities, replacing records with the same id.
    pub fn ingest(&self, db: &FacilityDb, records: &[Facility]) -> Result<usize, StorageError> {
        let count = db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for facility in records {
                facilities::upsert_facility(&tx, facility)?;
            }
            tx.commit()?;
            Ok(records.len())
        })?;

        info!(store = %db.kind(), count, "Facilities ingested");
        self.events.emit(EngineEvent::FacilitiesIngested {
            store: db.kind(),
            count,
        });
        Ok(count)
    }

    /// Recompute and persist every facility's score. Returns how many were scored.
    pub fn recompute_all(&self, db: &FacilityDb) -> Result<usize, StorageError> {
        db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let counts = dependencies::dependent_counts(&tx)?;
            let all = facilities::list_facilities(&tx, &FacilityQuery::all())?;
            for facility in &all {
                let dependents = counts.get(&facility.id).copied().unwrap_or(0);
                facilities::update_score(&tx, &facility.id, compute_score(facility, dependents))?;
            }
            tx.commit()?;
            Ok(all.len())
        })
    }

    pub fn count(&self, db: &FacilityDb) -> Result<i64, StorageError> {
        db.read(facilities::count_facilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreKind;
    use crate::model::{Coordinate, FacilityType};

    fn service() -> (FacilityService, FacilityDb) {
        (
            FacilityService::new(Arc::new(EventBus::new())),
            FacilityDb::open_in_memory(StoreKind::Online).unwrap(),
        )
    }

    #[test]
    fn test_ingest_and_recompute() {
        let (service, db) = service();
        let records = vec![
            Facility::new("a", "A", FacilityType::Hospital, Coordinate::new(1.0, 1.0)),
            Facility::new("b", "B", FacilityType::Food, Coordinate::new(1.0, 1.1)),
        ];
        assert_eq!(service.ingest(&db, &records).unwrap(), 2);
        assert_eq!(service.recompute_all(&db).unwrap(), 2);

        let hospital = service.get(&db, "a").unwrap();
        // 1.5 moderate default + 25 hospital bonus
        assert!((hospital.intervention_score - 26.5).abs() < 1e-9);
        assert_eq!(service.count(&db).unwrap(), 2);
    }

    #[test]
    fn test_load_applies_ledger_and_sorts() {
        let (service, db) = service();
        let records = vec![
            Facility::new("food", "Food", FacilityType::Food, Coordinate::new(1.0, 1.0)),
            Facility::new("hosp", "Hospital", FacilityType::Hospital, Coordinate::new(1.0, 1.1)),
        ];
        service.ingest(&db, &records).unwrap();
        service.recompute_all(&db).unwrap();

        let ledger = AdjustmentLedger::new();
        let ranked = service.load(&db, &ledger).unwrap();
        assert_eq!(ranked[0].id, "hosp");

        ledger.add("food", 40.0);
        let ranked = service.load(&db, &ledger).unwrap();
        assert_eq!(ranked[0].id, "food");
        assert!((ranked[0].intervention_score - 51.5).abs() < 1e-9);
    }

    #[test]
    fn test_rescore_missing_facility() {
        let (_, db) = service();
        assert!(db.with_conn(|conn| rescore_facility(conn, "nope")).unwrap().is_none());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let (service, db) = service();
        assert!(matches!(service.get(&db, "x"), Err(StorageError::NotFound(_))));
    }
}
