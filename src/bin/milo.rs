// ABOUTME: CLI entry point: plan, reconcile, and composite run-all cycles
// ABOUTME: Wires configuration, logging, the store, the LM client, and the lock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! `milo` — manual operation surface for the workout scheduler.
//!
//! Exit codes: 0 success (including degraded), 1 user/config error,
//! 2 transient external failure, 3 deadline/cancellation abort.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use milo_scheduler::config::{GoalsConfig, TemplateCatalog};
use milo_scheduler::database::SqliteStore;
use milo_scheduler::errors::AppResult;
use milo_scheduler::llm::OpenAiCompatibleClient;
use milo_scheduler::lock::CycleLock;
use milo_scheduler::logging::LoggingConfig;
use milo_scheduler::orchestrator::{Collaborators, CycleOptions, CycleSummary, Orchestrator};
use milo_scheduler::providers::synthetic::SyntheticCalendar;
use milo_scheduler::providers::SystemClock;

#[derive(Parser)]
#[command(name = "milo", version, about = "Autonomous workout scheduler")]
struct Cli {
    /// Path to the goals configuration
    #[arg(long, env = "MILO_GOALS", default_value = "config/goals.yaml")]
    config: PathBuf,

    /// Path to the workout template catalog
    #[arg(long, env = "MILO_TEMPLATES", default_value = "config/templates.yaml")]
    templates: PathBuf,

    /// Database URL for health and audit rows
    #[arg(long, env = "MILO_DATABASE_URL", default_value = "sqlite://milo.db")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan workouts over the forward horizon
    Plan {
        /// Horizon in days
        #[arg(long)]
        days: Option<u32>,
        /// Suppress calendar writes; audits still flow with executed=false
        #[arg(long)]
        dry_run: bool,
    },
    /// Reconcile past plans against recorded activities
    Reconcile {
        /// Trailing window in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Composite cycle: reconcile, then plan
    RunAll {
        /// Suppress calendar writes
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    fn cycle_options(&self) -> CycleOptions {
        match self {
            Self::Plan { days, dry_run } => CycleOptions {
                horizon_days: *days,
                dry_run: *dry_run,
                plan: true,
                reconcile: false,
                ..CycleOptions::default()
            },
            Self::Reconcile { days } => CycleOptions {
                reconcile_days: *days,
                plan: false,
                reconcile: true,
                ..CycleOptions::default()
            },
            Self::RunAll { dry_run } => CycleOptions {
                dry_run: *dry_run,
                ..CycleOptions::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = LoggingConfig::from_env().init() {
        eprintln!("cannot initialize logging: {err}");
        return ExitCode::from(1);
    }

    match run(&cli).await {
        Ok(summary) => {
            info!(
                created = summary.created,
                updated = summary.updated,
                deleted = summary.deleted,
                skipped = summary.skipped,
                degraded = summary.degraded,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "cycle failed");
            ExitCode::from(u8::try_from(err.code.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli) -> AppResult<CycleSummary> {
    let goals = Arc::new(GoalsConfig::load(&cli.config)?);
    let templates = Arc::new(TemplateCatalog::load(&cli.templates)?);

    // Single-flight: a second concurrent cycle exits with already_running
    let _lock = CycleLock::acquire(&cli.config)?;

    let store = SqliteStore::connect(&cli.database_url).await?;
    let lm = OpenAiCompatibleClient::from_env()?;

    // The remote calendar client is a deployment concern; implementations of
    // `CalendarClient` (CalDAV, Google, ...) are wired here. The in-memory
    // calendar keeps the binary operational offline.
    let calendar = Arc::new(SyntheticCalendar::default());

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            clock: Arc::new(SystemClock),
            calendar,
            health: Arc::new(store.clone()),
            audit: Arc::new(store),
            lm: Arc::new(lm),
        },
        goals,
        templates,
    ));

    orchestrator
        .run_contained(cli.command.cycle_options())
        .await
}
