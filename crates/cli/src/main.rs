//! `settingsctl` – operator CLI for the settings migration engine.
//!
//! Runs the same engine the host runs at bootstrap, against a JSON file
//! holding the option groups and counters. Useful to inspect and replay
//! migrations on a copy of a live store.

mod config;
mod host;
mod logging;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::CliConfig;
use migration_engine::diagnostics::TracingLogger;
use migration_engine::marker::VersionMarkerStore;
use migration_engine::platform::{FsResources, JsonFileStore};
use migration_engine::scenario::{load_scenario, run_scenario};
use migration_engine::types::{PlanReport, PlannedStep, ScenarioResult};
use migration_engine::{Engine, FailurePolicy, InstalledVersion, MigrationContext, RunReport, Status, Version};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "settingsctl",
    version,
    about = "Run and inspect versioned settings migrations"
)]
struct Cli {
    /// Extra config file layered over the shipped defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the store to the current version.
    Migrate {
        /// Version to migrate to (defaults to the configured one).
        #[arg(long)]
        current: Option<String>,
        /// Keep running the remaining steps after a failure.
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// Show which steps a migration would run, without writing.
    Plan {
        #[arg(long)]
        current: Option<String>,
    },

    /// List every registered step in execution order.
    Steps,

    /// Run a scripted scenario from a YAML file against an in-memory store.
    RunScenario {
        /// Path to the scenario YAML file.
        file: PathBuf,
    },

    /// Overwrite the version marker so steps can be replayed.
    ResetMarker {
        /// Target marker: a version, "versionless", or "missing" to delete it.
        #[arg(long, default_value = "missing")]
        to: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

// ===========================================================================
// Main
// ===========================================================================

fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    logging::init_logging(&config.logging);

    let status = match dispatch(cli.command, &config, cli.json) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {:#}", e);
            Status::Error
        }
    };

    // Exit with non-zero status on error/fail
    match status {
        Status::Pass | Status::Skip => {}
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
    }
}

fn dispatch(command: Commands, config: &CliConfig, json: bool) -> anyhow::Result<Status> {
    match command {
        Commands::Migrate {
            current,
            continue_on_failure,
        } => cmd_migrate(config, current.as_deref(), continue_on_failure, json),
        Commands::Plan { current } => cmd_plan(config, current.as_deref(), json),
        Commands::Steps => cmd_steps(json),
        Commands::RunScenario { file } => cmd_run_scenario(&file, json),
        Commands::ResetMarker { to, yes } => cmd_reset_marker(config, &to, yes),
    }
}

// ===========================================================================
// Context
// ===========================================================================

fn open_store(config: &CliConfig) -> anyhow::Result<Arc<JsonFileStore>> {
    let store = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("cannot open store {}", config.store_path.display()))?;
    Ok(Arc::new(store))
}

/// The same file backs both the options and the counters.
fn build_context(config: &CliConfig, store: Arc<JsonFileStore>) -> MigrationContext {
    MigrationContext::new(
        store.clone(),
        store,
        Arc::new(TracingLogger),
        Arc::new(FsResources::new(
            config.resources.tmp_base.clone(),
            config.resources.fonts_source.clone(),
        )),
        Arc::new(host::ConfigHooks::new(config.host.clone())),
    )
}

fn current_version(config: &CliConfig, flag: Option<&str>) -> anyhow::Result<Version> {
    let raw = flag.unwrap_or(&config.current_version);
    Version::parse(raw).with_context(|| format!("invalid current version {:?}", raw))
}

/// Parse an operator-supplied marker. Unlike a stored marker, an
/// unparsable value is rejected instead of being read as missing.
fn parse_target(raw: &str) -> anyhow::Result<InstalledVersion> {
    match raw.trim() {
        "" | "missing" => Ok(InstalledVersion::Missing),
        "versionless" => Ok(InstalledVersion::Versionless),
        other => match Version::parse(other) {
            Ok(v) => Ok(InstalledVersion::Release(v)),
            Err(e) => bail!("invalid marker {:?}: {}", other, e),
        },
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn cmd_migrate(
    config: &CliConfig,
    current: Option<&str>,
    continue_on_failure: bool,
    json: bool,
) -> anyhow::Result<Status> {
    let current = current_version(config, current)?;
    let ctx = build_context(config, open_store(config)?);
    let policy = if continue_on_failure {
        FailurePolicy::ContinueOnFailure
    } else {
        FailurePolicy::HaltOnFirstFailure
    };

    let report = Engine::standard().with_policy(policy).run(&ctx, &current);
    if json {
        print_json(&report);
    } else {
        print_report(&report);
    }
    Ok(report.status)
}

fn cmd_plan(config: &CliConfig, current: Option<&str>, json: bool) -> anyhow::Result<Status> {
    let current = current_version(config, current)?;
    let ctx = build_context(config, open_store(config)?);
    let report = migration_engine::plan::plan(&Engine::standard(), &ctx, &current)
        .context("cannot read the version marker")?;
    if json {
        print_json(&report);
    } else {
        print_plan(&report);
    }
    Ok(Status::Pass)
}

fn cmd_steps(json: bool) -> anyhow::Result<Status> {
    let steps = migration_engine::plan::describe(Engine::standard().registry());
    if json {
        print_json(&steps);
    } else {
        print_steps(&steps);
    }
    Ok(Status::Pass)
}

fn cmd_run_scenario(file: &Path, json: bool) -> anyhow::Result<Status> {
    let yaml = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read scenario file {}", file.display()))?;
    let scenario = load_scenario(&yaml)?;
    let result = run_scenario(&scenario)?;
    if json {
        print_json(&result);
    } else {
        print_scenario(&result);
    }
    Ok(result.overall_status)
}

fn cmd_reset_marker(config: &CliConfig, to: &str, yes: bool) -> anyhow::Result<Status> {
    let target = parse_target(to)?;
    let store = open_store(config)?;
    let marker = VersionMarkerStore::new(store.as_ref());
    let installed = marker.read()?;

    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Reset the version marker in {} from {:?} to {:?}?",
                config.store_path.display(),
                installed.to_string(),
                target.to_string()
            ))
            .default(false)
            .interact()
            .context("confirmation prompt failed")?;
        if !confirmed {
            println!("aborted");
            return Ok(Status::Skip);
        }
    }

    marker.reset(&target)?;
    tracing::info!(from = %installed, to = %target, "version marker reset");
    println!("marker reset: {:?} -> {:?}", installed.to_string(), target.to_string());
    Ok(Status::Pass)
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn print_json<T: Serialize>(value: &T) {
    let j = serde_json::to_string_pretty(value).unwrap_or_default();
    println!("{}", j);
}

fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Skip => "SKIP",
        Status::Error => "ERROR",
    }
}

fn print_report(r: &RunReport) {
    println!(
        "[{}] {} {:?} -> {}",
        status_label(r.status),
        r.transition,
        r.installed,
        r.current
    );
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);

    for step in &r.steps {
        let ms = r.timing_ms.steps.get(&step.name).copied().unwrap_or(0);
        println!("    {} ({}): {:?} {}ms", step.name, step.threshold, step.outcome, ms);
    }

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
    }
    println!("  marker written: {}", r.marker_written);
}

fn print_plan(p: &PlanReport) {
    println!("{} {:?} -> {}", p.transition, p.installed, p.current);
    if p.versionless_redirect {
        println!("  legacy settings found: upgrading from an unversioned install");
    }
    if p.steps.is_empty() {
        println!("  nothing to run");
    }
    print_steps(&p.steps);
}

fn print_steps(steps: &[PlannedStep]) {
    for step in steps {
        println!("  {:<32} {:<16} {:?}", step.name, step.threshold, step.direction);
    }
}

fn print_scenario(r: &ScenarioResult) {
    println!("Scenario: {}", r.name.as_deref().unwrap_or("<unnamed>"));
    println!("Overall: {}", status_label(r.overall_status));
    print_report(&r.report);
    for m in &r.mismatches {
        println!("  mismatch {}: expected {} got {}", m.what, m.expected, m.actual);
    }
}
