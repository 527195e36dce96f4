// dbbackup/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tar::Builder;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::BackupError;

/// Extension of the files the exporter writes (`<db>_<kind>_<ts>.sql`).
pub const ARTIFACT_EXTENSION: &str = "sql";

/// Lists the artifacts the exporter left directly inside `staging_dir`,
/// sorted by name.
///
/// An exporter that exits cleanly but writes nothing is still a failed
/// export, so an empty result is an `Artifact` error.
pub fn discover_artifacts(staging_dir: &Path) -> Result<Vec<String>> {
    let mut artifacts = Vec::new();
    for entry in WalkDir::new(staging_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| {
            format!("Failed to scan staging directory: {}", staging_dir.display())
        })?;
        let is_artifact = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION);
        if !is_artifact {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => artifacts.push(name.to_string()),
            None => warn!("⚠️ Skipping artifact with a non UTF-8 name: {}", entry.path().display()),
        }
    }

    if artifacts.is_empty() {
        return Err(BackupError::Artifact(format!(
            "export produced no output in {}",
            staging_dir.display()
        ))
        .into());
    }
    info!("Found {} artifact(s): {}", artifacts.len(), artifacts.join(", "));
    Ok(artifacts)
}

/// Creates the archive file. Fails if the path already exists, so a run never
/// writes into (or later cleans up) another run's archive.
pub fn create_archive_file(archive_path: &Path) -> Result<File> {
    File::create_new(archive_path)
        .with_context(|| format!("Failed to create archive file: {}", archive_path.display()))
}

/// Writes `artifacts` from `staging_dir` into `archive_file` as a gzipped tar.
///
/// Entries are stored under their base names only. Returns the archive size
/// in bytes once the data is synced to disk.
pub fn write_tar_gz_archive(
    archive_file: File,
    archive_path: &Path,
    staging_dir: &Path,
    artifacts: &[String],
) -> Result<u64> {
    info!(
        "🗜 Compressing {} file(s) to {}",
        artifacts.len(),
        archive_path.display()
    );

    let enc = GzEncoder::new(BufWriter::new(archive_file), Compression::default());
    let mut tar_builder = Builder::new(enc);

    for name in artifacts {
        let path = staging_dir.join(name);
        tar_builder.append_path_with_name(&path, name).with_context(|| {
            format!("Failed to append file {} as {} to archive", path.display(), name)
        })?;
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!("Failed to finish tar stream for archive: {}", archive_path.display())
    })?;
    let writer = encoder.finish().with_context(|| {
        format!("Failed to finish Gzip encoding for archive: {}", archive_path.display())
    })?;
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush archive: {}", archive_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync archive: {}", archive_path.display()))?;

    let size = file
        .metadata()
        .with_context(|| format!("Failed to stat archive: {}", archive_path.display()))?
        .len();
    info!(
        "✓ Tar.gz archive created successfully at {} ({} bytes)",
        archive_path.display(),
        size
    );
    Ok(size)
}
