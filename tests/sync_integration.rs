//! Integration tests for offline/online reconciliation
//!
//! These run against on-disk stores in a temporary directory so that
//! reopening an engine sees what the previous one wrote.

use std::sync::Arc;

use facility_triage::db::{reports, sync_status};
use facility_triage::ingest::RawFacilityRecord;
use facility_triage::model::{Condition, FacilityStatus, ReportInput, SupplyLevel};
use facility_triage::sync::{SimulatedPublicFeed, SyncOutcome};
use facility_triage::{Config, Engine, StoreKind, Stores};
use tempfile::TempDir;

fn config(dir: &TempDir, online: bool) -> Config {
    Config {
        storage_dir: dir.path().to_path_buf(),
        start_online: online,
        ..Config::for_tests()
    }
}

fn seeded_engine(dir: &TempDir, online: bool) -> Engine {
    let engine = Engine::open(config(dir, online)).unwrap();
    engine.seed_if_empty().unwrap();
    engine
}

fn bad_report() -> ReportInput {
    ReportInput {
        condition: Some(Condition::Bad),
        supply_level: Some(SupplyLevel::VeryLow),
        submitted_by: Some("field-team-3".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_offline_reports_reach_online_store_on_reconnect() {
    let dir = TempDir::new().unwrap();
    let engine = seeded_engine(&dir, false);

    let outcome = engine.report_problem("food-souq", &bad_report()).unwrap();
    assert!(!outcome.report.synced);

    let online = engine.stores().online().clone();
    let offline = engine.stores().offline().clone();
    assert_eq!(online.stats().unwrap().report_count, 0);
    assert_eq!(offline.stats().unwrap().unsynced_report_count, 1);

    assert!(engine.set_connectivity(true).await);

    assert_eq!(online.stats().unwrap().report_count, 1);
    assert_eq!(offline.stats().unwrap().unsynced_report_count, 0);
    let stamp = offline
        .with_conn(|conn| sync_status::get_sync_status(conn, "user_reports"))
        .unwrap()
        .unwrap();
    assert_eq!(stamp.pending_changes, 0);
    assert!(stamp.last_synced_at.is_some());
}

#[tokio::test]
async fn test_stores_survive_reopen_but_ledger_does_not() {
    let dir = TempDir::new().unwrap();
    {
        let engine = seeded_engine(&dir, true);
        let outcome = engine.report_problem("food-souq", &bad_report()).unwrap();
        assert!(outcome.validation.should_apply);
        engine.simulate_failure("power-khartoum").await.unwrap();
    }

    let engine = Engine::open(config(&dir, true)).unwrap();
    assert!(!engine.seed_if_empty().unwrap());
    assert!(engine.ledger().is_empty());

    let ranked = engine.load_facilities().unwrap();
    assert_eq!(ranked[0].id, "power-khartoum");
    assert_eq!(ranked[0].status, FacilityStatus::Failed);

    let stored = engine
        .stores()
        .online()
        .with_conn(|conn| reports::list_reports(conn, Some("food-souq")))
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_sync_suppressed_while_admin_action_held() {
    let dir = TempDir::new().unwrap();
    let engine = seeded_engine(&dir, false);
    engine.report_problem("food-souq", &bad_report()).unwrap();

    let guard = engine.sync().begin_admin_action().await;
    assert!(engine.set_connectivity(true).await);
    // The reconnect pass was skipped
    assert_eq!(engine.stores().offline().stats().unwrap().unsynced_report_count, 1);

    drop(guard);
    match engine.sync_now().await.unwrap() {
        SyncOutcome::Completed(report) => assert_eq!(report.reports_synced, 1),
        other => panic!("expected completed pass, got {other:?}"),
    }
}

#[tokio::test]
async fn test_public_update_merges_into_online_store() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir, true);
    std::fs::create_dir_all(&cfg.storage_dir).unwrap();
    let stores = Stores::open(&cfg.online_db_path(), &cfg.offline_db_path()).unwrap();
    let feed = Arc::new(SimulatedPublicFeed::new());
    let engine = Engine::with_source(cfg, stores, feed.clone());
    engine.seed_if_empty().unwrap();

    engine.simulate_failure("water-omdurman").await.unwrap();
    feed.publish(RawFacilityRecord {
        id: Some("water-omdurman".into()),
        name: Some("Omdurman Water Treatment (public)".into()),
        facility_type: Some("water".into()),
        lat: Some(15.6450),
        lng: Some(32.4800),
        status: Some("operational".into()),
        ..Default::default()
    })
    .unwrap();
    feed.publish(RawFacilityRecord {
        id: Some("food-karari".into()),
        name: Some("Karari Bakery".into()),
        facility_type: Some("food".into()),
        lat: Some(15.7000),
        lng: Some(32.4500),
        ..Default::default()
    })
    .unwrap();

    match engine.sync_now().await.unwrap() {
        SyncOutcome::Completed(report) => assert_eq!(report.facilities_merged, 2),
        other => panic!("expected completed pass, got {other:?}"),
    }

    let ranked = engine.load_facilities().unwrap();
    let merged = ranked.iter().find(|f| f.id == "water-omdurman").unwrap();
    assert_eq!(merged.status, FacilityStatus::Failed);
    assert_eq!(merged.name, "Omdurman Water Treatment (public)");
    assert!(ranked.iter().any(|f| f.id == "food-karari"));

    // Public updates land in the selected store only
    let offline = engine.stores().get(StoreKind::Offline).stats().unwrap();
    assert_eq!(offline.facility_count + 1, engine.stores().online().stats().unwrap().facility_count);
}
