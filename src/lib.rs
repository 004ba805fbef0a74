//! Facility Triage - prioritization and cascading-failure engine
//!
//! Ranks field facilities (water, power, shelter, food, hospital) by
//! intervention urgency, lets crowd reports nudge that ranking, simulates
//! outages that put nearby facilities at risk, and keeps an online and an
//! offline SQLite store reconciled under unreliable connectivity.
//!
//! ## Layers
//!
//! ```text
//! Engine (engine.rs)        - admin interface, store routing, ledger
//!   ├── SyncManager (sync/) - connectivity flag, sync passes
//!   └── Services (services/)
//!         ├── FacilityService   - ranking, ingest, score persistence
//!         ├── ReportService     - validation, report storage
//!         ├── ConnectionService - dependency graph
//!         └── CascadeService    - failure and resolution
//! Pure functions: scoring.rs, validator.rs, geo.rs
//! Repositories: db/*.rs over one FacilityDb per store
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! <local data dir>/facility-triage/
//! ├── online.db      # Authoritative store, target of admin actions
//! ├── offline.db     # Store used while disconnected
//! └── config.toml    # Configuration
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod geo;
pub mod scoring;
pub mod validator;
pub mod ledger;
pub mod db;
pub mod services;
pub mod ingest;
pub mod sync;
pub mod engine;

// Re-exports
pub use config::Config;
pub use error::StorageError;
pub use engine::Engine;
pub use db::{FacilityDb, StoreKind, Stores};
pub use ledger::AdjustmentLedger;
pub use model::{Facility, FacilityStatus, FacilityType, ReportInput};
pub use scoring::compute_score;
pub use validator::{validate, ReportValidator, ValidationOutcome};
pub use sync::{AdminActionGuard, SyncManager, SyncOutcome};
