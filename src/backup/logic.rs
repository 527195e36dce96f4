// dbbackup/src/backup/logic.rs
use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::info;

use super::guard::{FailureGuard, RunState};
use super::staging::CleanupOutcome;
use super::{RunContext, archive, db_dump, retention, staging};
use crate::config::{Retention, RunConfiguration};
use crate::utils::redacted::Redacted;

/// What a successful run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub archive_path: PathBuf,
    pub archive_bytes: u64,
    pub artifacts: Vec<String>,
    pub pruned: Vec<PathBuf>,
    /// Set when the raw dumps were kept, or could not all be removed.
    pub staging_left: Option<PathBuf>,
}

/// Runs the stages in order, keeping `guard` informed of every path this run
/// creates. Stage boundaries yield to the runtime so a pending termination
/// signal wins before the next stage starts.
pub(super) async fn perform_backup_orchestration(
    config: &RunConfiguration,
    password: &Redacted,
    guard: &mut FailureGuard,
    started_at: DateTime<Local>,
) -> Result<RunSummary> {
    let mut ctx = RunContext::new(config, started_at);
    info!("🚀 Starting backup run {}: {}", ctx.timestamp, config.summary());

    staging::create_staging_dir(&config.output_root, &ctx.staging_dir)?;
    guard.track_staging(&ctx.staging_dir);

    db_dump::run_export(config, password, &ctx.staging_dir).await?;
    guard.advance(RunState::Exported);
    tokio::task::yield_now().await;

    ctx.artifacts = archive::discover_artifacts(&ctx.staging_dir)?;
    let archive_file = archive::create_archive_file(&ctx.archive_path)?;
    guard.track_archive(&ctx.archive_path);
    let archive_bytes = archive::write_tar_gz_archive(
        archive_file,
        &ctx.archive_path,
        &ctx.staging_dir,
        &ctx.artifacts,
    )?;
    guard.advance(RunState::Archived);
    tokio::task::yield_now().await;

    let staging_left = match staging::clean_staging(&ctx.staging_dir, &ctx.artifacts, config.keep_sql)? {
        CleanupOutcome::Removed => None,
        CleanupOutcome::Kept | CleanupOutcome::LeftBehind => Some(ctx.staging_dir.clone()),
    };

    let pruned = match &config.retention {
        Retention::Days(days) => retention::prune_expired_archives(
            &config.output_root,
            *days,
            SystemTime::now(),
            &ctx.archive_path,
        )?,
        Retention::Disabled(raw) => {
            info!("Retention disabled (RETENTION_DAYS={:?}), keeping all archives.", raw);
            Vec::new()
        }
    };

    guard.finalize();

    let summary = RunSummary {
        archive_path: ctx.archive_path,
        archive_bytes,
        artifacts: ctx.artifacts,
        pruned,
        staging_left,
    };
    info!(
        "🎉 Backup completed: {} ({} file(s), {} bytes), {} expired archive(s) deleted",
        summary.archive_path.display(),
        summary.artifacts.len(),
        summary.archive_bytes,
        summary.pruned.len()
    );
    if let Some(dir) = &summary.staging_left {
        info!("Raw SQL files remain in {}", dir.display());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportMethod;
    use crate::errors::BackupError;
    use chrono::TimeZone;
    use std::path::Path;
    use tempfile::TempDir;

    const WRITE_TWO_DUMPS: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --output-dir) out="$2"; shift 2 ;;
    --database) db="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo 'CREATE TABLE t (id INT);' > "$out/${db}_structure_20240101.sql"
echo 'INSERT INTO t VALUES (1);' > "$out/${db}_data_20240101.sql"
"#;

    struct Fixture {
        dir: TempDir,
        config: RunConfiguration,
    }

    impl Fixture {
        fn new(exporter_body: &str, keep_sql: bool) -> anyhow::Result<Self> {
            let dir = tempfile::tempdir()?;
            let script = dir.path().join("exporter.sh");
            std::fs::write(&script, exporter_body)?;
            let output_root = dir.path().join("out");
            let config = RunConfiguration {
                db_host: "localhost".into(),
                db_port: 3306,
                db_user: "root".into(),
                db_password: Some(Redacted::new("pw")),
                db_name: "testdb".into(),
                export_method: ExportMethod::Full,
                log_file: output_root.join("backup.log"),
                output_root,
                retention: Retention::Days(7),
                interpreter: PathBuf::from("/bin/sh"),
                exporter_script: script,
                additional_args: Vec::new(),
                keep_sql,
                prompt_password: false,
            };
            Ok(Fixture { dir, config })
        }

        fn out(&self) -> &Path {
            &self.config.output_root
        }

        async fn run(&self, guard: &mut FailureGuard) -> Result<RunSummary> {
            let started_at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
            guard.advance(RunState::CredentialResolved);
            perform_backup_orchestration(&self.config, &Redacted::new("pw"), guard, started_at).await
        }
    }

    fn archive_entries(path: &Path) -> anyhow::Result<Vec<String>> {
        let file = std::fs::File::open(path)?;
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut names = Vec::new();
        for entry in archive.entries()? {
            names.push(entry?.path()?.to_string_lossy().into_owned());
        }
        Ok(names)
    }

    #[tokio::test]
    async fn test_successful_run_archives_and_removes_staging() -> anyhow::Result<()> {
        let fx = Fixture::new(WRITE_TWO_DUMPS, false)?;
        let mut guard = FailureGuard::new();
        let summary = fx.run(&mut guard).await?;

        assert_eq!(guard.state(), RunState::Finalized);
        assert_eq!(summary.archive_path, fx.out().join("backup_20240101_120000.tar.gz"));
        assert_eq!(
            archive_entries(&summary.archive_path)?,
            vec!["testdb_data_20240101.sql", "testdb_structure_20240101.sql"]
        );
        assert!(!fx.out().join("backup_20240101_120000").exists());
        assert!(summary.staging_left.is_none());

        drop(guard);
        assert!(summary.archive_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_keep_sql_preserves_staging() -> anyhow::Result<()> {
        let fx = Fixture::new(WRITE_TWO_DUMPS, true)?;
        let mut guard = FailureGuard::new();
        let summary = fx.run(&mut guard).await?;
        drop(guard);

        let staging = fx.out().join("backup_20240101_120000");
        assert_eq!(summary.staging_left.as_deref(), Some(staging.as_path()));
        assert_eq!(
            std::fs::read_to_string(staging.join("testdb_data_20240101.sql"))?,
            "INSERT INTO t VALUES (1);\n"
        );
        assert!(staging.join("testdb_structure_20240101.sql").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_exporter_failure_cleans_up() -> anyhow::Result<()> {
        let fx = Fixture::new("echo 'access denied' >&2\nexit 1\n", false)?;
        let mut guard = FailureGuard::new();
        let err = fx.run(&mut guard).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::Export { .. })));
        assert_eq!(guard.state(), RunState::StagingCreated);

        drop(guard);
        assert!(!fx.out().join("backup_20240101_120000").exists());
        assert!(!fx.out().join("backup_20240101_120000.tar.gz").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_export_is_artifact_error() -> anyhow::Result<()> {
        let fx = Fixture::new("exit 0\n", false)?;
        let mut guard = FailureGuard::new();
        let err = fx.run(&mut guard).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::Artifact(_))));

        drop(guard);
        assert!(!fx.out().join("backup_20240101_120000").exists());
        assert!(!fx.out().join("backup_20240101_120000.tar.gz").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_colliding_run_leaves_other_staging_alone() -> anyhow::Result<()> {
        let fx = Fixture::new(WRITE_TWO_DUMPS, false)?;
        let other = fx.out().join("backup_20240101_120000");
        std::fs::create_dir_all(&other)?;
        std::fs::write(other.join("other_run.sql"), "-- other")?;

        let mut guard = FailureGuard::new();
        assert!(fx.run(&mut guard).await.is_err());
        drop(guard);

        assert!(other.join("other_run.sql").is_file());
        assert!(fx.dir.path().exists());
        Ok(())
    }
}
