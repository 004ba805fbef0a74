//! SQLite stores for facilities, dependencies and reports
//!
//! Two stores with an identical schema live side by side:
//!
//! - **online** - the authoritative copy; admin actions always target it
//! - **offline** - the copy used while the caller has no connectivity
//!
//! Each store is a `FacilityDb`. Callers pick one through [`Stores::get`]
//! with a [`StoreKind`] rather than by name.
//!
//! ## Tables
//!
//! - `facilities` - facility records with their persisted score
//! - `dependencies` - dependent -> provider edges
//! - `user_reports` - crowd reports (append-only)
//! - `sync_status` - per-table sync bookkeeping
//! - `failure_events`, `interventions`, `facility_timers` - auxiliary

pub mod schema;
pub mod facilities;
pub mod dependencies;
pub mod reports;
pub mod sync_status;
pub mod failure_events;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::model::FacilityStatus;

/// Which of the two stores an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Online,
    Offline,
}

impl StoreKind {
    pub fn for_connectivity(online: bool) -> Self {
        if online {
            StoreKind::Online
        } else {
            StoreKind::Offline
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Online => "online",
            StoreKind::Offline => "offline",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded write-then-verify settings
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(150),
        }
    }
}

/// One SQLite store
pub struct FacilityDb {
    kind: StoreKind,
    conn: Mutex<Connection>,
}

impl FacilityDb {
    /// Open or create a store at the given path
    pub fn open(kind: StoreKind, db_path: &Path) -> Result<Self, StorageError> {
        info!(store = %kind, "Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| StorageError::Internal(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            kind,
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(kind: StoreKind) -> Result<Self, StorageError> {
        debug!(store = %kind, "Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            kind,
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        schema::init_schema(&conn)
    }

    /// Run a closure against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Read path: a transient store error is retried once, then returned.
    pub fn read<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: Fn(&Connection) -> Result<T, StorageError>,
    {
        match self.with_conn(&f) {
            Err(e) if e.is_transient() => {
                warn!(store = %self.kind, error = %e, "Read failed, retrying once");
                self.with_conn(&f)
            }
            other => other,
        }
    }

    /// Write a status and confirm it by reading it back.
    ///
    /// Each attempt runs the update and the read-back inside one immediate
    /// transaction. If the read-back disagrees the transaction is rolled
    /// back and the write retried after `policy.delay`, up to
    /// `policy.attempts` times. Returns the number of attempts used.
    pub async fn write_status_verified(
        &self,
        facility_id: &str,
        status: FacilityStatus,
        policy: VerifyPolicy,
    ) -> Result<u32, StorageError> {
        let attempts = policy.attempts.max(1);

        for attempt in 1..=attempts {
            let observed = self.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let changed = facilities::update_status(&tx, facility_id, status)?;
                if changed == 0 {
                    return Err(StorageError::NotFound(facility_id.to_string()));
                }
                let observed = facilities::get_status(&tx, facility_id)?;
                if observed == Some(status) {
                    tx.commit()?;
                }
                Ok(observed)
            })?;

            if observed == Some(status) {
                if attempt > 1 {
                    debug!(facility_id = %facility_id, attempt, "Status verified after retry");
                }
                return Ok(attempt);
            }

            debug!(
                store = %self.kind,
                facility_id = %facility_id,
                expected = %status,
                observed = ?observed,
                attempt,
                "Status read-back mismatch"
            );

            if attempt < attempts && !policy.delay.is_zero() {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(StorageError::InconsistentWrite {
            facility_id: facility_id.to_string(),
            expected: status.as_str().to_string(),
            attempts,
        })
    }

    /// Full reset: every data table emptied, sync rows kept
    pub fn reset(&self) -> Result<(), StorageError> {
        info!(store = %self.kind, "Resetting store");
        self.with_conn_mut(schema::clear_all_tables)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, StorageError> {
                let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                store: self.kind,
                facility_count: count("SELECT COUNT(*) FROM facilities")?,
                failed_count: count("SELECT COUNT(*) FROM facilities WHERE status = 'failed'")?,
                at_risk_count: count("SELECT COUNT(*) FROM facilities WHERE status = 'at_risk'")?,
                dependency_count: count("SELECT COUNT(*) FROM dependencies")?,
                report_count: count("SELECT COUNT(*) FROM user_reports")?,
                unsynced_report_count: count("SELECT COUNT(*) FROM user_reports WHERE synced = 0")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub store: StoreKind,
    pub facility_count: u64,
    pub failed_count: u64,
    pub at_risk_count: u64,
    pub dependency_count: u64,
    pub report_count: u64,
    pub unsynced_report_count: u64,
}

/// The online and offline stores
#[derive(Clone)]
pub struct Stores {
    online: Arc<FacilityDb>,
    offline: Arc<FacilityDb>,
}

impl Stores {
    pub fn new(online: Arc<FacilityDb>, offline: Arc<FacilityDb>) -> Self {
        Self { online, offline }
    }

    /// Open both stores under a storage directory
    pub fn open(online_path: &Path, offline_path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(
            Arc::new(FacilityDb::open(StoreKind::Online, online_path)?),
            Arc::new(FacilityDb::open(StoreKind::Offline, offline_path)?),
        ))
    }

    /// Two independent in-memory stores (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self::new(
            Arc::new(FacilityDb::open_in_memory(StoreKind::Online)?),
            Arc::new(FacilityDb::open_in_memory(StoreKind::Offline)?),
        ))
    }

    pub fn get(&self, kind: StoreKind) -> &Arc<FacilityDb> {
        match kind {
            StoreKind::Online => &self.online,
            StoreKind::Offline => &self.offline,
        }
    }

    pub fn online(&self) -> &Arc<FacilityDb> {
        &self.online
    }

    pub fn offline(&self) -> &Arc<FacilityDb> {
        &self.offline
    }
}

// Re-exports
pub use dependencies::DependencyRow;
pub use facilities::{FacilityQuery, SortDirection};
pub use failure_events::FailureEventRow;
pub use reports::ReportRow;
pub use sync_status::SyncStatusRow;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, Facility, FacilityType};
    use std::cell::Cell;

    fn store_with(id: &str) -> FacilityDb {
        let db = FacilityDb::open_in_memory(StoreKind::Online).unwrap();
        let f = Facility::new(id, "Pump", FacilityType::Power, Coordinate::new(15.5, 32.5));
        db.with_conn(|conn| facilities::upsert_facility(conn, &f)).unwrap();
        db
    }

    fn fast_policy() -> VerifyPolicy {
        VerifyPolicy {
            attempts: 5,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_verified_write_succeeds_first_attempt() {
        let db = store_with("p1");
        let attempts = db
            .write_status_verified("p1", FacilityStatus::Failed, fast_policy())
            .await
            .unwrap();
        assert_eq!(attempts, 1);
        let status = db.read(|conn| facilities::get_status(conn, "p1")).unwrap();
        assert_eq!(status, Some(FacilityStatus::Failed));
    }

    #[tokio::test]
    async fn test_verified_write_missing_facility() {
        let db = store_with("p1");
        let result = db
            .write_status_verified("ghost", FacilityStatus::Failed, fast_policy())
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_verified_write_exhausts_on_persistent_mismatch() {
        let db = store_with("p1");
        // A store that silently reverts status changes
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER revert_status AFTER UPDATE OF status ON facilities
                 BEGIN UPDATE facilities SET status = 'operational' WHERE id = NEW.id; END;",
            )?;
            Ok(())
        })
        .unwrap();

        let result = db
            .write_status_verified("p1", FacilityStatus::Failed, fast_policy())
            .await;
        match result {
            Err(StorageError::InconsistentWrite { attempts, expected, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(expected, "failed");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_read_retries_transient_error_once() {
        let db = store_with("p1");
        let calls = Cell::new(0);
        let status = db
            .read(|conn| {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    return Err(StorageError::Database(rusqlite::Error::QueryReturnedNoRows));
                }
                facilities::get_status(conn, "p1")
            })
            .unwrap();
        assert_eq!(status, Some(FacilityStatus::Operational));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_read_returns_second_failure() {
        let db = store_with("p1");
        let calls = Cell::new(0);
        let result: Result<(), _> = db.read(|_| {
            calls.set(calls.get() + 1);
            Err(StorageError::Database(rusqlite::Error::QueryReturnedNoRows))
        });
        assert!(matches!(result, Err(StorageError::Database(_))));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_read_does_not_retry_invalid_input() {
        let db = store_with("p1");
        let calls = Cell::new(0);
        let result: Result<(), _> = db.read(|_| {
            calls.set(calls.get() + 1);
            Err(StorageError::InvalidInput("bad id".into()))
        });
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_stores_are_independent() {
        let stores = Stores::open_in_memory().unwrap();
        let f = Facility::new("w1", "Well", FacilityType::Water, Coordinate::new(1.0, 1.0));
        stores
            .get(StoreKind::Offline)
            .with_conn(|conn| facilities::upsert_facility(conn, &f))
            .unwrap();

        assert_eq!(stores.offline().stats().unwrap().facility_count, 1);
        assert_eq!(stores.online().stats().unwrap().facility_count, 0);
        assert_eq!(stores.get(StoreKind::for_connectivity(false)).kind(), StoreKind::Offline);
    }

    #[test]
    fn test_reset() {
        let db = store_with("p1");
        db.reset().unwrap();
        assert_eq!(db.stats().unwrap().facility_count, 0);
    }
}
