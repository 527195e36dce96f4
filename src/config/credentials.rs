// dbbackup/src/config/credentials.rs
use anyhow::Result;
use std::io::{self, IsTerminal};
use tracing::info;

use crate::config::RunConfiguration;
use crate::errors::BackupError;
use crate::utils::redacted::Redacted;

/// Source of an interactively typed password.
pub trait PasswordPrompt {
    /// Whether someone can answer a prompt.
    fn is_interactive(&self) -> bool;

    /// Asks for a password without echoing it.
    fn read_password(&self, message: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn read_password(&self, message: &str) -> io::Result<String> {
        rpassword::prompt_password(message)
    }
}

/// Resolves the database password before anything touches the disk.
///
/// A configured password (even an empty one) is used as is. Otherwise the
/// operator is prompted, if prompting is enabled and stdin is a terminal.
pub fn resolve_password(config: &RunConfiguration, prompt: &dyn PasswordPrompt) -> Result<Redacted> {
    if let Some(password) = &config.db_password {
        if password.is_empty() {
            info!("DB_PASSWORD is set but empty, connecting without a password.");
        }
        return Ok(password.clone());
    }

    if !config.prompt_password {
        return Err(BackupError::Credential(
            "no password available: DB_PASSWORD is not set and PROMPT_DB_PASSWORD is not enabled"
                .to_string(),
        )
        .into());
    }
    if !prompt.is_interactive() {
        return Err(BackupError::Credential(
            "no password available: stdin is not interactive, cannot prompt".to_string(),
        )
        .into());
    }

    let message = format!(
        "Password for {}@{}:{} ({}): ",
        config.db_user, config.db_host, config.db_port, config.db_name
    );
    let password = prompt
        .read_password(&message)
        .map_err(|e| BackupError::Credential(format!("failed to read password: {}", e)))?;
    Ok(Redacted::new(password))
}
