//! Adjustment Ledger - per-facility score deltas from validated reports
//!
//! The ledger is ephemeral: it is owned by one `Engine`
//! instance and cleared when that engine starts. Reports themselves are
//! persisted in `user_reports`, so a later version can rebuild the ledger
//! from them; this one does not.
//!
//! Deltas are never negative, so a facility's adjustment only grows within
//! the ledger's lifetime.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, warn};

/// One applied adjustment, kept for audit
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentEntry {
    pub report_id: Option<String>,
    pub facility_id: String,
    pub delta: f64,
    pub applied_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct AdjustmentLedger {
    totals: DashMap<String, f64>,
    audit: Mutex<Vec<AdjustmentEntry>>,
}

impl AdjustmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta for a facility. Negative or non-finite deltas are ignored.
    pub fn add(&self, facility_id: &str, delta: f64) -> f64 {
        self.record(None, facility_id, delta)
    }

    /// Add a delta produced by a stored report.
    pub fn add_for_report(&self, report_id: &str, facility_id: &str, delta: f64) -> f64 {
        self.record(Some(report_id.to_string()), facility_id, delta)
    }

    fn record(&self, report_id: Option<String>, facility_id: &str, delta: f64) -> f64 {
        if !delta.is_finite() || delta < 0.0 {
            warn!(facility_id = %facility_id, delta, "Ignoring invalid adjustment");
            return self.get(facility_id);
        }

        let total = {
            let mut entry = self.totals.entry(facility_id.to_string()).or_insert(0.0);
            *entry += delta;
            *entry
        };

        if let Ok(mut audit) = self.audit.lock() {
            audit.push(AdjustmentEntry {
                report_id,
                facility_id: facility_id.to_string(),
                delta,
                applied_at: Utc::now(),
            });
        }

        debug!(facility_id = %facility_id, delta, total, "Adjustment recorded");
        total
    }

    /// Cumulative adjustment, 0 for unknown facilities
    pub fn get(&self, facility_id: &str) -> f64 {
        self.totals.get(facility_id).map(|v| *v).unwrap_or(0.0)
    }

    pub fn clear_all(&self) {
        self.totals.clear();
        if let Ok(mut audit) = self.audit.lock() {
            audit.clear();
        }
    }

    /// Audit entries in application order
    pub fn entries(&self) -> Vec<AdjustmentEntry> {
        self.audit.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
