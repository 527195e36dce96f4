pub mod logging;
pub mod redacted;
pub mod signals;

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use which::which;

use crate::errors::BackupError;

/// Interpreters tried on the search path, in order.
const PATH_INTERPRETERS: &[&str] = &["python3", "python"];
/// Virtual environment directories looked for next to the program.
const VENV_DIRS: &[&str] = &[".venv", "venv"];

/// Directory holding the running executable. Program-relative defaults
/// (config file, exporter, venv, `exports/`) hang off this.
pub fn program_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    match exe.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir().context("Failed to read the current directory"),
    }
}

/// Finds the interpreter that runs the export program.
///
/// Order: explicit override, then a virtual environment next to the program,
/// then the first interpreter on `PATH`. An override that is not executable is
/// an error, never a reason to fall through to the next candidate.
pub fn find_interpreter(override_bin: Option<&str>, program_dir: &Path) -> Result<PathBuf> {
    if let Some(bin) = override_bin {
        return which(bin).map_err(|e| {
            BackupError::config(format!("PYTHON_BIN {:?} is not an executable: {}", bin, e)).into()
        });
    }

    for venv in VENV_DIRS {
        let candidate = program_dir.join(venv).join("bin").join("python");
        if candidate.is_file() {
            if let Ok(found) = which(&candidate) {
                return Ok(found);
            }
        }
    }

    PATH_INTERPRETERS
        .iter()
        .find_map(|name| which(name).ok())
        .ok_or_else(|| {
            BackupError::config(format!(
                "no Python interpreter found (set PYTHON_BIN, create {}/.venv, or install one of {:?})",
                program_dir.display(),
                PATH_INTERPRETERS
            ))
            .into()
        })
}

/// Checks that the export program exists as a readable regular file.
pub fn ensure_readable_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(BackupError::config(format!(
            "export program not found: {}",
            path.display()
        ))
        .into());
    }
    File::open(path).map_err(|e| {
        BackupError::config(format!(
            "export program is not readable: {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(path: &Path, mode: u32) -> anyhow::Result<()> {
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(path, "#!/bin/sh\nexit 0\n")?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    #[test]
    fn test_override_must_be_executable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let not_exec = dir.path().join("python");
        write_script(&not_exec, 0o644)?;

        let err = find_interpreter(Some(not_exec.to_str().unwrap()), dir.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::Config(_))));

        let found = find_interpreter(Some("/bin/sh"), dir.path())?;
        assert!(found.ends_with("sh"));
        Ok(())
    }

    #[test]
    fn test_venv_interpreter_preferred_over_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let venv_python = dir.path().join(".venv").join("bin").join("python");
        write_script(&venv_python, 0o755)?;

        let found = find_interpreter(None, dir.path())?;
        assert_eq!(found, venv_python);
        Ok(())
    }

    #[test]
    fn test_ensure_readable_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("exporter.py");
        assert!(ensure_readable_file(&script).is_err());
        std::fs::write(&script, "print('hi')\n")?;
        ensure_readable_file(&script)?;
        assert!(ensure_readable_file(dir.path()).is_err());
        Ok(())
    }
}
