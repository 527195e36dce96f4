//! Database Backup Runner
//!
//! Runs an external database exporter, packs its SQL dumps into one
//! timestamped tar.gz archive and deletes archives past their retention
//! window. Partial output is removed whenever a run does not succeed.

// dbbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use backup::RunSummary;
use backup::guard::{FailureGuard, RunState};
use config::credentials::{TerminalPrompt, resolve_password};
use config::{ConfigSources, RunConfiguration};
use errors::BackupError;
use utils::logging::RunLogger;
use utils::redacted::Redacted;
use utils::signals::ShutdownSignal;

/// Export a database, archive the dump files and prune old archives
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Extra config file whose values override every other source
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep the raw SQL files after archiving
    #[arg(short, long)]
    keep_sql: bool,
}

/// Main entry point for a backup run
#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let logger = match RunLogger::init() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut guard = FailureGuard::new();
    let outcome = match prepare_run(&args, &logger, &mut guard) {
        Ok((config, password)) => run_until_signal(&config, &password, &mut guard).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(summary) => {
            info!(
                "✅ Backup run completed successfully: {}",
                summary.archive_path.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Backup run failed during {:?}: {:#}", guard.state(), e);
            guard.fail();
            ExitCode::FAILURE
        }
    }
}

/// Resolves configuration and credentials. Nothing is written to disk here
/// apart from opening the log file.
fn prepare_run(
    args: &Args,
    logger: &RunLogger,
    guard: &mut FailureGuard,
) -> Result<(RunConfiguration, Redacted)> {
    let sources = ConfigSources::from_process(utils::program_dir()?, args.config.clone());
    let config = RunConfiguration::resolve(&sources, args.keep_sql)?;
    guard.advance(RunState::ConfigResolved);
    logger.attach_file(&config.log_file);

    let password = resolve_password(&config, &TerminalPrompt)?;
    guard.advance(RunState::CredentialResolved);
    Ok((config, password))
}

/// Runs the backup flow, abandoning it if SIGINT or SIGTERM arrives first.
/// Abandoning drops the flow (and with it the exporter child process).
async fn run_until_signal(
    config: &RunConfiguration,
    password: &Redacted,
    guard: &mut FailureGuard,
) -> Result<RunSummary> {
    let shutdown = ShutdownSignal::register();
    tokio::select! {
        res = backup::run_backup_flow(config, password, guard) => res,
        signal = shutdown.recv() => Err(BackupError::Interrupted(signal).into()),
    }
}
