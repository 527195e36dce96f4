// dbbackup/src/backup/db_dump.rs
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::RunConfiguration;
use crate::errors::BackupError;
use crate::utils::redacted::{REDACTED, Redacted};

/// Arguments passed to the export program after its own path.
///
/// `--password` is left out entirely when the password is empty, and the
/// `ADDITIONAL_ARGS` words go last.
pub fn build_export_args(config: &RunConfiguration, password: &Redacted, output_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--host".into(),
        config.db_host.clone().into(),
        "--port".into(),
        config.db_port.to_string().into(),
        "--user".into(),
        config.db_user.clone().into(),
        "--database".into(),
        config.db_name.clone().into(),
        "--export-method".into(),
        config.export_method.as_str().into(),
        "--output-dir".into(),
        output_dir.as_os_str().to_owned(),
    ];
    if !password.is_empty() {
        args.push("--password".into());
        args.push(password.expose().into());
    }
    args.extend(config.additional_args.iter().map(OsString::from));
    args
}

/// Printable form of the export command with the password masked.
fn display_command(config: &RunConfiguration, args: &[OsString]) -> String {
    let mut parts = vec![
        config.interpreter.display().to_string(),
        config.exporter_script.display().to_string(),
    ];
    let mut mask_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push(REDACTED.to_string());
        } else {
            parts.push(arg.to_string());
        }
        mask_next = arg == "--password";
    }
    parts.join(" ")
}

/// How long a dropped export waits for its killed child to be reaped.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the running export program. Dropping it before the program has been
/// waited on kills the program and reaps it, so nothing keeps writing into
/// the staging directory once the run is abandoned.
struct RunningExport {
    child: Child,
    reaped: bool,
}

impl Drop for RunningExport {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill export program: {}", e);
            return;
        }
        let deadline = Instant::now() + KILL_REAP_TIMEOUT;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) => {
                    info!("Export program stopped.");
                    return;
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    warn!("Failed to reap export program: {}", e);
                    return;
                }
            }
        }
        warn!("Export program did not exit within {:?} of being killed", KILL_REAP_TIMEOUT);
    }
}

/// Runs the export program into `output_dir` and waits for it to exit.
///
/// A non-zero exit is an `Export` error carrying the program's stderr. If
/// this future is dropped before the program finishes, the program is killed
/// and reaped before the drop returns.
pub async fn run_export(config: &RunConfiguration, password: &Redacted, output_dir: &Path) -> Result<()> {
    let args = build_export_args(config, password, output_dir);
    info!(
        "🔍 Exporting {} ({}) into {}",
        config.db_name,
        config.export_method,
        output_dir.display()
    );
    info!("Running: {}", display_command(config, &args));

    let child = Command::new(&config.interpreter)
        .arg(&config.exporter_script)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "Failed to execute export program {} with {}",
                config.exporter_script.display(),
                config.interpreter.display()
            )
        })?;
    let mut running = RunningExport { child, reaped: false };
    let mut stdout_pipe = running.child.stdout.take().context("Export program stdout was not captured")?;
    let mut stderr_pipe = running.child.stderr.take().context("Export program stderr was not captured")?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let (status, _, _) = tokio::try_join!(
        running.child.wait(),
        stdout_pipe.read_to_end(&mut stdout),
        stderr_pipe.read_to_end(&mut stderr),
    )
    .context("Failed while waiting for the export program")?;
    running.reaped = true;
    let output = std::process::Output { status, stdout, stderr };

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("exporter: {}", line);
    }

    if !output.status.success() {
        return Err(BackupError::Export {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }

    for line in String::from_utf8_lossy(&output.stderr).lines() {
        warn!("exporter (stderr): {}", line);
    }
    info!("✓ Export program finished successfully.");
    Ok(())
}
