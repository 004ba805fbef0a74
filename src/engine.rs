//! Engine facade
//!
//! One `Engine` owns both stores, the services, the sync manager and the
//! adjustment ledger. Independent engines share nothing, so tests can run
//! several side by side.
//!
//! Store routing:
//!
//! | Operation | Store |
//! |-----------|-------|
//! | `load_facilities`, `report_problem` | selected by connectivity |
//! | `simulate_failure`, `resolve_failure` | always online |
//! | `ingest`, `rebuild_connections`, `recompute_scores`, `reset` | both |
//!
//! The ledger is cleared when an engine is built: adjustments from crowd
//! reports only last for the life of the process. Reports stay in
//! `user_reports` either way.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::db::{DbStats, DependencyRow, FacilityDb, Stores};
use crate::error::StorageError;
use crate::ingest::{normalize, seed_records, RawFacilityRecord};
use crate::ledger::AdjustmentLedger;
use crate::model::{Facility, ReportInput};
use crate::services::{EventBus, FailureOutcome, ReportOutcome, ResolutionOutcome, Services};
use crate::sync::{PublicUpdateSource, SimulatedPublicFeed, SyncManager, SyncOutcome};

pub struct Engine {
    config: Config,
    stores: Stores,
    services: Arc<Services>,
    sync: Arc<SyncManager>,
    ledger: AdjustmentLedger,
}

impl Engine {
    /// Engine with the in-process public feed
    pub fn new(config: Config, stores: Stores) -> Self {
        Self::with_source(config, stores, Arc::new(SimulatedPublicFeed::new()))
    }

    pub fn with_source(config: Config, stores: Stores, source: Arc<dyn PublicUpdateSource>) -> Self {
        let events = Arc::new(EventBus::new());
        let services = Arc::new(Services::new(&config, events));
        let sync = Arc::new(SyncManager::new(
            stores.clone(),
            services.clone(),
            source,
            config.start_online,
        ));

        let ledger = AdjustmentLedger::new();
        ledger.clear_all();

        Self {
            config,
            stores,
            services,
            sync,
            ledger,
        }
    }

    /// Open both stores under `config.storage_dir`
    pub fn open(config: Config) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.storage_dir)?;
        let stores = Stores::open(&config.online_db_path(), &config.offline_db_path())?;
        info!(dir = %config.storage_dir.display(), online = config.start_online, "Engine opened");
        Ok(Self::new(config, stores))
    }

    /// Engine over two in-memory stores
    pub fn in_memory(config: Config) -> Result<Self, StorageError> {
        Ok(Self::new(config, Stores::open_in_memory()?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.services.events
    }

    pub fn ledger(&self) -> &AdjustmentLedger {
        &self.ledger
    }

    fn both_stores(&self) -> [&Arc<FacilityDb>; 2] {
        [self.stores.online(), self.stores.offline()]
    }

    /// Ranked facilities from the store matching current connectivity
    pub fn load_facilities(&self) -> Result<Vec<Facility>, StorageError> {
        self.services.facility.load(self.sync.selected_store(), &self.ledger)
    }

    pub fn report_problem(&self, facility_id: &str, input: &ReportInput) -> Result<ReportOutcome, StorageError> {
        self.services
            .report
            .submit(self.sync.selected_store(), &self.ledger, facility_id, input)
    }

    pub async fn simulate_failure(&self, facility_id: &str) -> Result<FailureOutcome, StorageError> {
        let _guard = self.sync.begin_admin_action().await;
        self.services
            .cascade
            .simulate_failure(self.stores.online(), facility_id)
            .await
    }

    pub async fn resolve_failure(&self, facility_id: &str) -> Result<ResolutionOutcome, StorageError> {
        let _guard = self.sync.begin_admin_action().await;
        self.services
            .cascade
            .resolve_failure(self.stores.online(), facility_id)
            .await
    }

    /// Rebuild the dependency graph in both stores and rescore.
    ///
    /// Returns the edges of the currently selected store.
    pub fn rebuild_connections(&self) -> Result<Vec<DependencyRow>, StorageError> {
        for db in self.both_stores() {
            self.services.connection.rebuild(db)?;
            self.services.facility.recompute_all(db)?;
        }
        self.services.connection.list(self.sync.selected_store())
    }

    /// See [`SyncManager::set_connectivity`]
    pub async fn set_connectivity(&self, online: bool) -> bool {
        self.sync.set_connectivity(online).await
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome, StorageError> {
        self.sync.sync_pass().await
    }

    /// Normalize records and store them in both stores, then rebuild
    /// connections and scores.
    pub fn ingest(&self, records: Vec<RawFacilityRecord>) -> Result<usize, StorageError> {
        let facilities: Vec<Facility> = records.into_iter().map(normalize).collect();
        for db in self.both_stores() {
            self.services.facility.ingest(db, &facilities)?;
        }
        self.rebuild_connections()?;
        Ok(facilities.len())
    }

    /// Ingest the simulated dataset if the online store has no facilities
    pub fn seed_if_empty(&self) -> Result<bool, StorageError> {
        if self.services.facility.count(self.stores.online())? > 0 {
            debug!("Stores already populated, skipping seed");
            return Ok(false);
        }
        let count = self.ingest(seed_records())?;
        info!(count, "Seeded simulated facilities");
        Ok(true)
    }

    pub fn recompute_scores(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for db in self.both_stores() {
            total += self.services.facility.recompute_all(db)?;
        }
        Ok(total)
    }

    /// Empty both stores and the ledger
    pub fn reset(&self) -> Result<(), StorageError> {
        for db in self.both_stores() {
            db.reset()?;
        }
        self.ledger.clear_all();
        Ok(())
    }

    pub fn stats(&self) -> Result<Vec<DbStats>, StorageError> {
        self.both_stores().into_iter().map(|db| db.stats()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreKind;
    use crate::model::{Condition, FacilityStatus};

    fn engine() -> Engine {
        Engine::in_memory(Config::for_tests()).unwrap()
    }

    fn record(id: &str, facility_type: &str, lat: f64, lng: f64) -> RawFacilityRecord {
        RawFacilityRecord {
            id: Some(id.into()),
            facility_type: Some(facility_type.into()),
            lat: Some(lat),
            lng: Some(lng),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_actions_only_touch_online_store() {
        let engine = engine();
        engine
            .ingest(vec![record("p", "power", 15.52, 32.52), record("s", "shelter", 15.49, 32.49)])
            .unwrap();

        engine.set_connectivity(false).await;
        engine.simulate_failure("p").await.unwrap();

        // The offline view is unchanged until reconnect
        let offline_view = engine.load_facilities().unwrap();
        assert!(offline_view.iter().all(|f| f.status == FacilityStatus::Operational));

        engine.set_connectivity(true).await;
        let online_view = engine.load_facilities().unwrap();
        assert_eq!(online_view[0].id, "p");
        assert_eq!(online_view[0].status, FacilityStatus::Failed);
        assert_eq!(online_view[1].status, FacilityStatus::AtRisk);
    }

    #[tokio::test]
    async fn test_guard_released_after_admin_action() {
        let engine = engine();
        engine.ingest(vec![record("p", "power", 15.52, 32.52)]).unwrap();
        engine.simulate_failure("p").await.unwrap();
        assert!(!engine.sync().admin_action_in_flight());

        assert!(engine.resolve_failure("missing").await.is_err());
        assert!(!engine.sync().admin_action_in_flight());
    }

    #[test]
    fn test_report_adjusts_ranking_but_not_record() {
        let engine = engine();
        engine
            .ingest(vec![record("a", "food", 1.0, 1.0), record("b", "food", 1.0, 1.1)])
            .unwrap();

        let input = ReportInput {
            condition: Some(Condition::Bad),
            ..Default::default()
        };
        let outcome = engine.report_problem("b", &input).unwrap();
        assert!(outcome.validation.should_apply);

        let ranked = engine.load_facilities().unwrap();
        assert_eq!(ranked[0].id, "b");
        assert_eq!(ranked[0].condition, Condition::Fair);
        assert_eq!(engine.ledger().len(), 1);
    }

    #[test]
    fn test_seed_and_reset() {
        let engine = engine();
        assert!(engine.seed_if_empty().unwrap());
        assert!(!engine.seed_if_empty().unwrap());

        let stats = engine.stats().unwrap();
        assert_eq!(stats[0].store, StoreKind::Online);
        assert_eq!(stats[0].facility_count, stats[1].facility_count);
        assert!(stats[0].dependency_count > 0);

        engine.reset().unwrap();
        assert!(engine.load_facilities().unwrap().is_empty());
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn test_new_engine_starts_with_empty_ledger() {
        let stores = Stores::open_in_memory().unwrap();
        let first = Engine::new(Config::for_tests(), stores.clone());
        first.ingest(vec![record("a", "food", 1.0, 1.0)]).unwrap();
        first
            .report_problem(
                "a",
                &ReportInput {
                    condition: Some(Condition::Bad),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!first.ledger().is_empty());

        let second = Engine::new(Config::for_tests(), stores);
        assert!(second.ledger().is_empty());
        assert_eq!(second.load_facilities().unwrap().len(), 1);
    }
}
