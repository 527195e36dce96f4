// dbbackup/src/backup/retention.rs
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::info;
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

const ARCHIVE_NAME_PATTERN: &str = r"^backup_\d{8}_\d{6}\.tar\.gz$";

/// Matcher for the `backup_<YYYYmmdd>_<HHMMSS>.tar.gz` naming scheme.
pub fn archive_name_pattern() -> Result<Regex> {
    Regex::new(ARCHIVE_NAME_PATTERN).context("Failed to compile archive name pattern")
}

/// Deletes archives in `output_root` whose modification time is more than
/// `days` days before `now`. Returns the deleted paths.
///
/// Only regular files directly in `output_root` with an archive name are
/// considered, and `current_archive` (this run's output) is always kept.
pub fn prune_expired_archives(
    output_root: &Path,
    days: u64,
    now: SystemTime,
    current_archive: &Path,
) -> Result<Vec<PathBuf>> {
    let window = Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY));
    let archive_name = archive_name_pattern()?;
    info!(
        "Pruning archives older than {} day(s) in {}",
        days,
        output_root.display()
    );

    let mut deleted = Vec::new();
    for entry in WalkDir::new(output_root).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| {
            format!("Failed to scan output directory: {}", output_root.display())
        })?;
        let named_like_archive = entry.file_name().to_str().is_some_and(|name| archive_name.is_match(name));
        if !entry.file_type().is_file() || !named_like_archive || entry.path() == current_archive {
            continue;
        }

        let modified = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata of {}", entry.path().display()))?
            .modified()
            .with_context(|| format!("Failed to read mtime of {}", entry.path().display()))?;
        // A modification time in the future counts as fresh.
        let expired = now.duration_since(modified).is_ok_and(|age| age > window);
        if !expired {
            continue;
        }

        std::fs::remove_file(entry.path())
            .with_context(|| format!("Failed to delete expired archive {}", entry.path().display()))?;
        info!("🗑 Deleted expired archive {}", entry.path().display());
        deleted.push(entry.into_path());
    }

    if deleted.is_empty() {
        info!("No expired archives to delete.");
    }
    Ok(deleted)
}
