use std::process::ExitStatus;
use thiserror::Error;

/// Fatal failure classes of a backup run.
///
/// These travel inside `anyhow::Error` so call sites can keep adding context;
/// use `downcast_ref::<BackupError>()` to recover the class.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("export failed: exporter exited with {status}{}", stderr_suffix(.stderr))]
    Export { status: ExitStatus, stderr: String },

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("interrupted by {0}")]
    Interrupted(&'static str),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nStderr: {}", trimmed)
    }
}

impl BackupError {
    pub fn config(msg: impl Into<String>) -> Self {
        BackupError::Config(msg.into())
    }
}
