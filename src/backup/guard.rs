// dbbackup/src/backup/guard.rs
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Progress of a run. `Finalized` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Started,
    ConfigResolved,
    CredentialResolved,
    StagingCreated,
    Exported,
    Archived,
    Finalized,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finalized | RunState::Failed)
    }
}

/// Scope guard that removes a run's partial output unless the run was
/// finalized.
///
/// Created once when the process starts. Cleanup happens on [`FailureGuard::fail`]
/// or on drop, so error returns, panics and a dropped (interrupted) run future
/// all end up here. Only paths handed to `track_*` are removed, and the
/// orchestrator hands over a path only after this run created it.
#[derive(Debug)]
pub struct FailureGuard {
    state: RunState,
    staging_dir: Option<PathBuf>,
    archive_path: Option<PathBuf>,
}

impl Default for FailureGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureGuard {
    pub fn new() -> Self {
        FailureGuard {
            state: RunState::Started,
            staging_dir: None,
            archive_path: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, next: RunState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }

    pub fn track_staging(&mut self, staging_dir: &Path) {
        self.staging_dir = Some(staging_dir.to_path_buf());
        self.advance(RunState::StagingCreated);
    }

    pub fn track_archive(&mut self, archive_path: &Path) {
        self.archive_path = Some(archive_path.to_path_buf());
    }

    /// Marks the run successful; nothing will be removed afterwards.
    pub fn finalize(&mut self) {
        self.advance(RunState::Finalized);
    }

    /// Moves the run to `Failed` and removes whatever partial output exists.
    /// Returns the paths actually removed. Does nothing after `finalize`, and
    /// only cleans once.
    pub fn fail(&mut self) -> Vec<PathBuf> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        let failed_in = self.state;
        self.state = RunState::Failed;

        let mut removed = Vec::new();
        if let Some(dir) = self.staging_dir.take().filter(|d| d.exists()) {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!("🧹 Removed partial staging directory {}", dir.display());
                    removed.push(dir);
                }
                Err(e) => warn!("⚠️ Failed to remove staging directory {}: {}", dir.display(), e),
            }
        }
        if let Some(archive) = self.archive_path.take().filter(|a| a.exists()) {
            match std::fs::remove_file(&archive) {
                Ok(()) => {
                    info!("🧹 Removed partial archive {}", archive.display());
                    removed.push(archive);
                }
                Err(e) => warn!("⚠️ Failed to remove archive {}: {}", archive.display(), e),
            }
        }
        if !removed.is_empty() {
            info!("Cleanup after failure in state {:?} finished.", failed_in);
        }
        removed
    }
}

impl Drop for FailureGuard {
    fn drop(&mut self) {
        self.fail();
    }
}
