//! Service layer for the triage engine
//!
//! Services hold the domain rules between the engine facade and the
//! repositories. Each one is store-agnostic: the caller passes the
//! [`FacilityDb`](crate::db::FacilityDb) to operate on. Services handle:
//! - Scoring and ranking
//! - Cross-facility orchestration (cascades, connection planning)
//! - Event emission for audit
//!
//! ## Architecture
//!
//! ```text
//! Engine / CLI
//!     ↓
//! Service Layer (domain rules)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite (online + offline stores)
//! ```

pub mod events;
pub mod facility_service;
pub mod connection_service;
pub mod report_service;
pub mod cascade_service;

// Re-exports
pub use events::{EngineEvent, EventBus, EventListener};
pub use facility_service::FacilityService;
pub use connection_service::ConnectionService;
pub use report_service::{ReportOutcome, ReportService};
pub use cascade_service::{CascadeService, CascadeSettings, FailureOutcome, ResolutionOutcome};

use std::sync::Arc;

use crate::config::Config;
use crate::db::VerifyPolicy;
use crate::validator::ReportValidator;

/// Service container shared by the engine and the sync manager
pub struct Services {
    pub facility: Arc<FacilityService>,
    pub connection: Arc<ConnectionService>,
    pub report: Arc<ReportService>,
    pub cascade: Arc<CascadeService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services from configuration with a shared event bus
    pub fn new(config: &Config, events: Arc<EventBus>) -> Self {
        let cascade = CascadeSettings {
            radius_km: config.cascade_radius_km,
            verify: VerifyPolicy {
                attempts: config.verify_attempts,
                delay: config.verify_delay(),
            },
        };
        let validator = ReportValidator::new(config.report_threshold, config.report_adjustment_cap);

        Self {
            facility: Arc::new(FacilityService::new(events.clone())),
            connection: Arc::new(ConnectionService::new(config.connection_cap_km, events.clone())),
            report: Arc::new(ReportService::new(validator, events.clone())),
            cascade: Arc::new(CascadeService::new(cascade, events.clone())),
            events,
        }
    }
}
