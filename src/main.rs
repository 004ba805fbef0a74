//! Facility Triage CLI
//!
//! ## Usage
//!
//! ```bash
//! # Seed the simulated dataset (skipped if stores are populated)
//! facility-triage seed
//!
//! # Ranked facility list from the store matching connectivity
//! facility-triage list
//! facility-triage --offline list
//!
//! # Submit a crowd report
//! facility-triage report water-omdurman --condition bad --supply very_low
//!
//! # Admin actions (always against the online store)
//! facility-triage simulate power-khartoum
//! facility-triage resolve power-khartoum
//!
//! # Reconcile queued offline reports, or keep syncing until Ctrl+C
//! facility-triage sync
//! facility-triage run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use facility_triage::ingest::load_records;
use facility_triage::model::{Condition, Facility, Importance, PopulationLevel, ReportInput, SupplyLevel};
use facility_triage::services::events::spawn_logging_listener;
use facility_triage::sync::{spawn_sync_scheduler, SyncOutcome};
use facility_triage::{Config, Engine};

#[derive(Parser, Debug)]
#[command(name = "facility-triage")]
#[command(about = "Facility prioritization and cascading-failure engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory for both stores
    #[arg(long, env = "FACILITY_TRIAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Start without connectivity (reads and reports use the offline store)
    #[arg(long, env = "FACILITY_TRIAGE_OFFLINE")]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest facilities: the simulated dataset, or a JSON file of records
    Seed {
        /// JSON array of facility records
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Empty both stores first
        #[arg(long)]
        reset: bool,
    },

    /// List facilities ranked by intervention score
    List {
        /// Number of facilities to show
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Submit a crowd report for a facility
    Report {
        facility_id: String,
        /// excellent, good, fair, poor, bad
        #[arg(long)]
        condition: Option<String>,
        /// very_high, high, medium, low, very_low
        #[arg(long)]
        supply: Option<String>,
        /// very_low, low, medium, high, very_high
        #[arg(long)]
        population: Option<String>,
        /// not_important, moderate, important, very_important
        #[arg(long)]
        importance: Option<String>,
        /// Submitter tag
        #[arg(long)]
        by: Option<String>,
    },

    /// Fail a facility and mark its neighbours at risk
    Simulate { facility_id: String },

    /// Resolve a failed facility
    Resolve { facility_id: String },

    /// Rebuild the dependency graph in both stores
    Rebuild,

    /// Run one sync pass
    Sync,

    /// Show per-store counts
    Stats,

    /// Run the sync scheduler until Ctrl+C
    Run,
}

fn print_facilities(facilities: &[Facility]) {
    for (rank, f) in facilities.iter().enumerate() {
        println!(
            "{:>3}. {:<28} {:<9} {:<12} {:>9.1}  {}",
            rank + 1,
            f.id,
            f.facility_type,
            f.status,
            f.intervention_score,
            f.name
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("facility_triage=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load config
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    if cli.offline {
        config.start_online = false;
    }

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let seed_on_empty = config.seed_on_empty;
    let engine = Engine::open(config).context("opening stores")?;

    if seed_on_empty && !matches!(cli.command, Commands::Seed { .. }) {
        engine.seed_if_empty()?;
    }

    match cli.command {
        Commands::Seed { file, reset } => {
            if reset {
                engine.reset()?;
            }
            let count = match file {
                Some(path) => engine.ingest(load_records(&path)?)?,
                None if reset => engine.ingest(facility_triage::ingest::seed_records())?,
                None => {
                    if !engine.seed_if_empty()? {
                        println!("Stores already populated; use --reset to reseed");
                    }
                    0
                }
            };
            if count > 0 {
                println!("Ingested {count} facilities");
            }
        }

        Commands::List { count } => {
            let mut facilities = engine.load_facilities()?;
            if let Some(count) = count {
                facilities.truncate(count);
            }
            println!("Store: {}", engine.sync().selected_kind());
            print_facilities(&facilities);
        }

        Commands::Report {
            facility_id,
            condition,
            supply,
            population,
            importance,
            by,
        } => {
            let input = ReportInput {
                condition: condition.as_deref().map(Condition::parse_lenient),
                supply_level: supply.as_deref().map(SupplyLevel::parse_lenient),
                population_level: population.as_deref().map(PopulationLevel::parse_lenient),
                importance: importance.as_deref().map(Importance::parse_lenient),
                submitted_by: by,
            };
            let outcome = engine.report_problem(&facility_id, &input)?;
            if outcome.validation.should_apply {
                println!(
                    "Report applied: severity {:.1}, +{:.1} points (session total {:.1})",
                    outcome.validation.severity_score, outcome.validation.point_adjustment, outcome.total_adjustment
                );
            } else {
                println!(
                    "Report stored without effect: severity {:.1} below threshold",
                    outcome.validation.severity_score
                );
            }
        }

        Commands::Simulate { facility_id } => {
            let outcome = engine.simulate_failure(&facility_id).await?;
            println!("{} failed (score {:.1})", outcome.failed.id, outcome.failed.intervention_score);
            for f in &outcome.at_risk {
                println!("  at risk: {} (score {:.1})", f.id, f.intervention_score);
            }
            if !outcome.verified {
                println!("  warning: failed status could not be verified");
            }
        }

        Commands::Resolve { facility_id } => {
            let outcome = engine.resolve_failure(&facility_id).await?;
            println!("{} resolved", outcome.resolved.id);
            for f in &outcome.restored {
                println!("  restored: {}", f.id);
            }
            for id in &outcome.still_at_risk {
                println!("  still at risk: {id}");
            }
        }

        Commands::Rebuild => {
            let edges = engine.rebuild_connections()?;
            for edge in &edges {
                println!(
                    "{} -> {} ({}, {:.1} km)",
                    edge.dependent_id,
                    edge.provider_id,
                    edge.dependency_type,
                    edge.distance_km.unwrap_or_default()
                );
            }
            println!("{} connections", edges.len());
        }

        Commands::Sync => match engine.sync_now().await? {
            SyncOutcome::Completed(report) => println!(
                "Synced {} reports, merged {} facilities",
                report.reports_synced, report.facilities_merged
            ),
            SyncOutcome::Skipped { reason } => println!("Sync skipped: {reason}"),
        },

        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats()?)?);
        }

        Commands::Run => {
            let listener = spawn_logging_listener(engine.events().clone());
            let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
            let scheduler = spawn_sync_scheduler(
                Arc::clone(engine.sync()),
                engine.config().sync_interval(),
                shutdown_rx,
            );

            info!("Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");

            let _ = shutdown_tx.send(());
            let _ = scheduler.await;
            listener.abort();

            for stats in engine.stats()? {
                info!(
                    store = %stats.store,
                    facilities = stats.facility_count,
                    failed = stats.failed_count,
                    at_risk = stats.at_risk_count,
                    unsynced_reports = stats.unsynced_report_count,
                    "Final store stats"
                );
            }
        }
    }

    Ok(())
}
