use anyhow::Context;
use clap::{Parser, Subcommand};
use dbrefresh_core::{
    ConnectionProfile, IgnorableErrorSet, LogContext, MySqlSessions, MysqlClient, MysqlDump,
    PatchApplier, PatchFile, PatchOutcome, RefreshOptions, RefreshReport, Refresher,
    SnapshotStore, StdinConfirmation, detect_restore_strategy, discover_patches, init_cli_logging,
    preflight,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, warn};

mod config;
use config::Config;

#[cfg(test)]
mod cli_tests;

#[derive(Parser)]
#[command(name = "dbrefresh")]
#[command(about = "Refresh a local database from a production snapshot and replay SQL patches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot, reset and reload the target, then apply SQL changes (default)
    Refresh {
        /// Keep the current target database and only apply SQL changes
        #[arg(long)]
        no_reset: bool,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Make sure today's snapshot exists and print its path
    Snapshot,
    /// Apply SQL change files to the target without resetting it
    Apply {
        /// Files to apply in the given order; defaults to the patch directory
        files: Vec<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Refresh { .. } => "refresh",
            Commands::Snapshot => "snapshot",
            Commands::Apply { .. } => "apply",
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Refresh {
            no_reset: false,
            json: false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real environment variables take precedence
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_cli_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let command = cli.command.unwrap_or_default();
    let context = LogContext::new(command.name());
    let started = Instant::now();

    let result = run(command, cli.config)
        .instrument(context.span())
        .await;

    match result {
        Ok(()) => {
            context.info(&format!(
                "Finished in {:.2} seconds",
                started.elapsed().as_secs_f64()
            ));
            ExitCode::SUCCESS
        }
        Err(e) => {
            context.error(&format!("{:#}", e));
            eprintln!(
                "--- Aborted after {:.2} seconds ---",
                started.elapsed().as_secs_f64()
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load(config_path.as_deref())?;
    config.validate()?;

    match command {
        Commands::Refresh { no_reset, json } => {
            let reset = config.refresh.reset && !no_reset;
            let report = refresh(&config, reset).await?;
            print_report(&report, json)
        }
        Commands::Snapshot => {
            let store = snapshot_store(&config)?;
            let snapshot = store.current_snapshot().await?;
            info!(snapshot = %snapshot.name(), size_mb = snapshot.size_mb(), "Snapshot ready");
            println!("{}", snapshot.path.display());
            Ok(())
        }
        Commands::Apply { files } => {
            let started = Instant::now();
            let outcomes = apply(&config, files).await?;
            let skipped: usize = outcomes.iter().map(|o| o.skipped.len()).sum();
            println!(
                "--- Applied {} SQL change files ({} statements skipped) in {:.2} seconds ---",
                outcomes.len(),
                skipped,
                started.elapsed().as_secs_f64()
            );
            Ok(())
        }
    }
}

async fn refresh(config: &Config, reset: bool) -> anyhow::Result<RefreshReport> {
    let target = config.target_profile()?;
    info!(server = %target, reset, "Starting database refresh");

    preflight(&[config.tools.mysql.as_str(), config.tools.mysqldump.as_str()]).await;

    let strategy = detect_restore_strategy()?;
    let store = snapshot_store(config)?;
    let applier = patch_applier(config, &target);
    let client = MysqlClient::new(&config.tools.mysql, target, strategy)
        .context("Failed to prepare the mysql client")?;
    info!(strategy = client.strategy_name(), "Restore strategy selected");

    let options = RefreshOptions {
        reset,
        patches_dir: config.paths.patches_dir.clone(),
        skip_level: config.refresh.skip_log_level,
    };
    let outcome = Refresher::new(&store, &client, &StdinConfirmation, &applier, options)
        .run()
        .await;

    // the credentials file goes away whether or not the run succeeded
    if let Err(e) = client.cleanup() {
        warn!("Failed to remove credentials file: {}", e);
    }

    Ok(outcome?)
}

async fn apply(config: &Config, files: Vec<PathBuf>) -> anyhow::Result<Vec<PatchOutcome>> {
    let target = config.target_profile()?;
    let patches = if files.is_empty() {
        discover_patches(&config.paths.patches_dir)?
    } else {
        files
            .into_iter()
            .enumerate()
            .map(|(position, path)| PatchFile { path, position })
            .collect()
    };

    info!(server = %target, count = patches.len(), "Importing SQL changes");
    let applier = patch_applier(config, &target);
    Ok(applier
        .apply_all(&patches, config.refresh.skip_log_level)
        .await?)
}

fn snapshot_store(config: &Config) -> anyhow::Result<SnapshotStore> {
    let origin = config.origin_profile()?;
    let dump = MysqlDump::new(
        &config.tools.mysqldump,
        config.tools.dump_args.clone(),
        origin,
    );
    Ok(SnapshotStore::new(
        config.paths.snapshots_dir.clone(),
        Arc::new(dump),
    ))
}

fn patch_applier(config: &Config, target: &ConnectionProfile) -> PatchApplier {
    let ignorable =
        IgnorableErrorSet::mysql_defaults().with_extra_codes(&config.refresh.extra_ignored_codes);
    PatchApplier::new(Arc::new(MySqlSessions::new(target)), ignorable)
}

fn print_report(report: &RefreshReport, json: bool) -> anyhow::Result<()> {
    if json {
        let output =
            serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        println!("{}", output);
        return Ok(());
    }

    for patch in &report.patches {
        println!(
            "{}: {} statements, {} skipped",
            patch.path.display(),
            patch.executed,
            patch.skipped.len()
        );
    }
    println!(
        "--- Completed database import in {:.2} seconds ---",
        report.elapsed_secs
    );
    if report.statements_skipped() > 0 {
        warn!(
            skipped = report.statements_skipped(),
            "Some statements were skipped, review the log above"
        );
    }
    Ok(())
}
