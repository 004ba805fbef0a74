//! Sync Module - store selection and reconciliation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Sync Manager                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  connectivity flag   - picks the store for regular traffic      │
//! │  admin action guard  - suppresses sync while a cascade runs     │
//! │  sync pass           - queued reports + public updates          │
//! │  scheduler           - periodic pass while online               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sync pass, run on every offline to online transition and by the
//! scheduler:
//!
//! 1. copies reports queued in the offline store into the online store and
//!    marks them synced
//! 2. merges public facility updates into the selected store, keeping the
//!    local status of failed and at-risk facilities
//! 3. stamps `sync_status` in both stores
//!
//! Sync passes and admin actions share one read/write lock: admin actions
//! hold the read side for their whole duration, a pass holds the write side
//! for its whole duration. A pass never waits; it is skipped while any
//! [`AdminActionGuard`] is alive. An admin action that starts during a pass
//! waits for the pass to finish.

pub mod feed;

pub use feed::{PublicUpdateSource, SimulatedPublicFeed};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

use crate::db::{facilities, reports, sync_status, FacilityDb, StoreKind, Stores};
use crate::error::StorageError;
use crate::ingest::normalize;
use crate::model::FacilityStatus;
use crate::services::{EngineEvent, Services};

/// Tables stamped at the end of a sync pass
const STAMPED_TABLES: &[&str] = &["user_reports", "facilities"];

/// In-flight admin action token. Sync passes are skipped while one is held.
pub struct AdminActionGuard {
    in_flight: Arc<AtomicUsize>,
    _token: OwnedRwLockReadGuard<()>,
}

impl Drop for AdminActionGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts from a completed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub reports_synced: usize,
    pub facilities_merged: usize,
    pub synced_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped { reason: String },
}

/// Sync manager owns the connectivity flag and reconciles the two stores
pub struct SyncManager {
    stores: Stores,
    services: Arc<Services>,
    source: Arc<dyn PublicUpdateSource>,
    online: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    exclusion: Arc<RwLock<()>>,
}

impl SyncManager {
    pub fn new(stores: Stores, services: Arc<Services>, source: Arc<dyn PublicUpdateSource>, online: bool) -> Self {
        Self {
            stores,
            services,
            source,
            online: AtomicBool::new(online),
            in_flight: Arc::new(AtomicUsize::new(0)),
            exclusion: Arc::new(RwLock::new(())),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Store for regular reads and report submission
    pub fn selected_kind(&self) -> StoreKind {
        StoreKind::for_connectivity(self.is_online())
    }

    pub fn selected_store(&self) -> &Arc<FacilityDb> {
        self.stores.get(self.selected_kind())
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Acquire the token held for the duration of a simulate or resolve call.
    ///
    /// Waits for a running sync pass to finish. Admin actions do not
    /// exclude each other.
    pub async fn begin_admin_action(&self) -> AdminActionGuard {
        let token = self.exclusion.clone().read_owned().await;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        AdminActionGuard {
            in_flight: self.in_flight.clone(),
            _token: token,
        }
    }

    pub fn admin_action_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Update the connectivity flag.
    ///
    /// Returns true when this call moved the manager from offline to online;
    /// a sync pass has then already run. A failing pass is logged only.
    pub async fn set_connectivity(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return false;
        }

        info!(online, store = %self.selected_kind(), "Connectivity changed");
        if !online {
            return false;
        }

        match self.sync_pass().await {
            Ok(SyncOutcome::Completed(report)) => {
                debug!(reports = report.reports_synced, merged = report.facilities_merged, "Reconnect sync finished");
            }
            Ok(SyncOutcome::Skipped { reason }) => {
                debug!(reason = %reason, "Reconnect sync skipped");
            }
            Err(e) => {
                warn!(error = %e, "Reconnect sync failed");
            }
        }
        true
    }

    fn skipped(&self, reason: &str) -> SyncOutcome {
        debug!(reason, "Sync pass skipped");
        self.services.events.emit(EngineEvent::SyncSkipped {
            reason: reason.to_string(),
        });
        SyncOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    /// Run one reconciliation pass
    pub async fn sync_pass(&self) -> Result<SyncOutcome, StorageError> {
        if self.admin_action_in_flight() {
            return Ok(self.skipped("admin action in flight"));
        }
        if !self.is_online() {
            return Ok(self.skipped("offline"));
        }
        // Held until the pass returns
        let Ok(_pass) = self.exclusion.try_write() else {
            let reason = if self.admin_action_in_flight() {
                "admin action in flight"
            } else {
                "sync pass already running"
            };
            return Ok(self.skipped(reason));
        };

        let reports_synced = self.push_queued_reports()?;

        let updates = self.source.fetch_updates().await?;
        let facilities_merged = self.merge_public_updates(updates)?;

        let synced_at = chrono::Utc::now().to_rfc3339();
        self.stamp_sync_status(&synced_at);

        info!(reports_synced, facilities_merged, "Sync pass completed");
        self.services.events.emit(EngineEvent::SyncCompleted {
            reports_synced,
            facilities_merged,
        });

        Ok(SyncOutcome::Completed(SyncReport {
            reports_synced,
            facilities_merged,
            synced_at,
        }))
    }

    /// Copy queued offline reports to the online store, then flag them synced
    fn push_queued_reports(&self) -> Result<usize, StorageError> {
        let queued = self.stores.offline().read(reports::list_unsynced)?;
        if queued.is_empty() {
            return Ok(0);
        }

        self.stores.online().with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for report in &queued {
                reports::insert_report_if_absent(&tx, report)?;
            }
            tx.commit()?;
            Ok(())
        })?;
        self.stores.offline().with_conn(reports::mark_all_synced)?;

        debug!(count = queued.len(), "Queued reports pushed online");
        Ok(queued.len())
    }

    fn merge_public_updates(&self, updates: Vec<crate::ingest::RawFacilityRecord>) -> Result<usize, StorageError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let db = self.selected_store();
        let merged = db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut merged = 0;
            for raw in updates {
                let mut facility = normalize(raw);
                // Local cascade state wins over the public copy
                if let Some(local @ (FacilityStatus::Failed | FacilityStatus::AtRisk)) =
                    facilities::get_status(&tx, &facility.id)?
                {
                    facility.status = local;
                }
                facilities::upsert_facility(&tx, &facility)?;
                merged += 1;
            }
            tx.commit()?;
            Ok(merged)
        })?;

        self.services.connection.rebuild(db)?;
        self.services.facility.recompute_all(db)?;
        Ok(merged)
    }

    /// Bookkeeping failures are logged and never abort the pass
    fn stamp_sync_status(&self, synced_at: &str) {
        for kind in [StoreKind::Online, StoreKind::Offline] {
            for table in STAMPED_TABLES {
                if let Err(e) = self.stores.get(kind).with_conn(|conn| sync_status::mark_synced(conn, table, synced_at)) {
                    warn!(store = %kind, table, error = %e, "Failed to stamp sync status");
                }
            }
        }
    }
}

/// Run a sync pass every `interval` while online until `shutdown` fires
pub fn spawn_sync_scheduler(
    manager: Arc<SyncManager>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Sync scheduler started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if !manager.is_online() {
                        continue;
                    }
                    if let Err(e) = manager.sync_pass().await {
                        warn!(error = %e, "Scheduled sync failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }
    })
}
