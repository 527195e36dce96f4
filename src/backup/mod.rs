mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod guard;
pub(crate) mod retention;
pub(crate) mod staging;

use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;

use crate::config::RunConfiguration;
use crate::utils::redacted::Redacted;
use guard::FailureGuard;

pub use logic::RunSummary;

/// Run timestamp format: seconds resolution, sorts lexically.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths and findings of a single run. Owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub timestamp: String,
    pub staging_dir: PathBuf,
    pub archive_path: PathBuf,
    /// Base names of the exporter's files, filled in after the export.
    pub artifacts: Vec<String>,
}

impl RunContext {
    pub fn new(config: &RunConfiguration, started_at: DateTime<Local>) -> Self {
        let timestamp = started_at.format(RUN_TIMESTAMP_FORMAT).to_string();
        RunContext {
            staging_dir: config.output_root.join(format!("backup_{}", timestamp)),
            archive_path: config.output_root.join(format!("backup_{}.tar.gz", timestamp)),
            artifacts: Vec::new(),
            timestamp,
        }
    }
}

/// Public entry point for one backup run: export, archive, clean up, prune.
///
/// `guard` must already be past credential resolution. It is finalized when
/// the run succeeds; on any error it is left armed for the caller to drop.
pub async fn run_backup_flow(
    config: &RunConfiguration,
    password: &Redacted,
    guard: &mut FailureGuard,
) -> Result<RunSummary> {
    logic::perform_backup_orchestration(config, password, guard, Local::now()).await
}
