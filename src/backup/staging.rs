// dbbackup/src/backup/staging.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// What happened to the staging directory after archiving.
#[derive(Debug)]
pub enum CleanupOutcome {
    /// `KEEP_SQL` asked for the raw dumps to stay.
    Kept,
    /// Artifacts and directory are gone.
    Removed,
    /// Artifacts are gone but the directory could not be removed (usually
    /// because the exporter left something else behind).
    LeftBehind,
}

/// Creates the per-run staging directory under `output_root`.
///
/// The directory itself must not exist yet: a run never adopts a staging
/// directory it did not create.
pub fn create_staging_dir(output_root: &Path, staging_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_root).with_context(|| {
        format!("Failed to create output directory: {}", output_root.display())
    })?;
    fs::create_dir(staging_dir).with_context(|| {
        format!(
            "Failed to create staging directory {} (is another run using the same timestamp?)",
            staging_dir.display()
        )
    })?;
    info!("📂 Staging directory created at: {}", staging_dir.display());
    Ok(())
}

/// Removes the archived artifacts and then the staging directory, unless
/// `keep_sql` is set.
///
/// Failing to delete an artifact is fatal. Failing to remove the directory
/// afterwards only warns.
pub fn clean_staging(staging_dir: &Path, artifacts: &[String], keep_sql: bool) -> Result<CleanupOutcome> {
    if keep_sql {
        info!("📁 Keeping raw SQL files in {}", staging_dir.display());
        return Ok(CleanupOutcome::Kept);
    }

    for name in artifacts {
        let path = staging_dir.join(name);
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete artifact: {}", path.display()))?;
    }

    match fs::remove_dir(staging_dir) {
        Ok(()) => {
            info!("✓ Removed raw SQL files and staging directory {}", staging_dir.display());
            Ok(CleanupOutcome::Removed)
        }
        Err(e) => {
            warn!(
                "⚠️ Staging directory {} was not removed: {}",
                staging_dir.display(),
                e
            );
            Ok(CleanupOutcome::LeftBehind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(root: &Path, names: &[&str]) -> anyhow::Result<std::path::PathBuf> {
        let staging = root.join("backup_20240101_120000");
        create_staging_dir(root, &staging)?;
        for name in names {
            fs::write(staging.join(name), "-- dump\n")?;
        }
        Ok(staging)
    }

    #[test]
    fn test_create_refuses_existing_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let staging = staged(dir.path(), &[])?;
        assert!(create_staging_dir(dir.path(), &staging).is_err());
        Ok(())
    }

    #[test]
    fn test_create_makes_output_root() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("out").join("nested");
        let staging = root.join("backup_20240101_120000");
        create_staging_dir(&root, &staging)?;
        assert!(staging.is_dir());
        Ok(())
    }

    #[test]
    fn test_keep_leaves_everything() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let names = ["a_structure.sql", "a_data.sql"];
        let staging = staged(dir.path(), &names)?;
        let artifacts: Vec<String> = names.iter().map(|s| s.to_string()).collect();

        let outcome = clean_staging(&staging, &artifacts, true)?;
        assert!(matches!(outcome, CleanupOutcome::Kept));
        for name in names {
            assert_eq!(fs::read_to_string(staging.join(name))?, "-- dump\n");
        }
        Ok(())
    }

    #[test]
    fn test_remove_deletes_artifacts_and_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let staging = staged(dir.path(), &["a_structure.sql"])?;

        let outcome = clean_staging(&staging, &["a_structure.sql".to_string()], false)?;
        assert!(matches!(outcome, CleanupOutcome::Removed));
        assert!(!staging.exists());
        Ok(())
    }

    #[test]
    fn test_unexpected_leftover_only_warns() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let staging = staged(dir.path(), &["a_structure.sql", "exporter.tmp"])?;

        let outcome = clean_staging(&staging, &["a_structure.sql".to_string()], false)?;
        assert!(matches!(outcome, CleanupOutcome::LeftBehind));
        assert!(!staging.join("a_structure.sql").exists());
        assert!(staging.join("exporter.tmp").exists());
        Ok(())
    }
}
