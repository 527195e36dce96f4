// dbbackup/src/config/mod.rs
pub mod credentials;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::BackupError;
use crate::utils::redacted::Redacted;
use crate::utils::{ensure_readable_file, find_interpreter};

/// Option names understood in config files and the environment.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "DB_HOST",
    "DB_PORT",
    "DB_USER",
    "DB_PASSWORD",
    "DB_NAME",
    "EXPORT_METHOD",
    "OUTPUT_ROOT",
    "RETENTION_DAYS",
    "PYTHON_BIN",
    "EXPORTER_SCRIPT",
    "ADDITIONAL_ARGS",
    "LOG_FILE",
    "KEEP_SQL",
    "PROMPT_DB_PASSWORD",
];

/// Config file looked for next to the executable.
pub const DEFAULT_CONFIG_FILE: &str = "backup.conf";
/// Export program looked for next to the executable.
pub const DEFAULT_EXPORTER_SCRIPT: &str = "mariadb_exporter.py";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USER: &str = "root";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const DEFAULT_OUTPUT_DIR: &str = "exports";
const DEFAULT_LOG_FILE: &str = "backup.log";

/// One configuration source, restricted to recognized option names.
pub type ConfigLayer = HashMap<String, String>;

/// What the exporter should dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMethod {
    Structure,
    Data,
    Full,
}

impl ExportMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMethod::Structure => "structure",
            ExportMethod::Data => "data",
            ExportMethod::Full => "full",
        }
    }
}

impl FromStr for ExportMethod {
    type Err = BackupError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "structure" => Ok(ExportMethod::Structure),
            "data" => Ok(ExportMethod::Data),
            "full" => Ok(ExportMethod::Full),
            _ => Err(BackupError::config(format!(
                "EXPORT_METHOD must be one of structure, data, full (got {:?})",
                s
            ))),
        }
    }
}

impl fmt::Display for ExportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive retention. Pruning only happens for `Days`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retention {
    Days(u64),
    /// `RETENTION_DAYS` held something other than a non-negative integer.
    Disabled(String),
}

impl Retention {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Retention::Days(DEFAULT_RETENTION_DAYS),
            Some(value) if value.chars().all(|c| c.is_ascii_digit()) => value
                .parse()
                .map(Retention::Days)
                .unwrap_or_else(|_| Retention::Disabled(value.to_string())),
            Some(value) => Retention::Disabled(value.to_string()),
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Retention::Days(days) => write!(f, "{} days", days),
            Retention::Disabled(raw) => write!(f, "disabled ({:?})", raw),
        }
    }
}

/// Fully resolved settings for one run. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    /// `None` when no source mentions `DB_PASSWORD`; `Some("")` when one sets it empty.
    pub db_password: Option<Redacted>,
    pub db_name: String,
    pub export_method: ExportMethod,
    pub output_root: PathBuf,
    pub retention: Retention,
    pub interpreter: PathBuf,
    pub exporter_script: PathBuf,
    /// `ADDITIONAL_ARGS` split on whitespace; quoting is not supported.
    pub additional_args: Vec<String>,
    pub log_file: PathBuf,
    pub keep_sql: bool,
    pub prompt_password: bool,
}

/// Where configuration comes from for one invocation.
#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub program_dir: PathBuf,
    pub extra_config: Option<PathBuf>,
    pub environment: ConfigLayer,
}

impl ConfigSources {
    /// Sources for the running process: its environment, the config file next
    /// to the executable, and the `--config` file if one was given.
    pub fn from_process(program_dir: PathBuf, extra_config: Option<PathBuf>) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        ConfigSources {
            program_dir,
            extra_config,
            environment: recognized_only(vars),
        }
    }
}

/// Keeps the recognized option names out of arbitrary key/value pairs.
pub fn recognized_only<I>(pairs: I) -> ConfigLayer
where
    I: IntoIterator<Item = (String, String)>,
{
    pairs
        .into_iter()
        .filter(|(key, _)| RECOGNIZED_KEYS.contains(&key.as_str()))
        .collect()
}

/// Reads a `KEY=value` config file into a layer. The process environment is
/// never touched.
pub fn load_layer_from_file(path: &Path) -> Result<ConfigLayer> {
    if !path.is_file() {
        return Err(BackupError::config(format!("config file not found: {}", path.display())).into());
    }
    let entries = dotenvy::from_path_iter(path).map_err(|e| {
        BackupError::config(format!("cannot read config file {}: {}", path.display(), e))
    })?;

    let mut pairs = Vec::new();
    for entry in entries {
        let (key, value) = entry.map_err(|e| {
            BackupError::config(format!("malformed config file {}: {}", path.display(), e))
        })?;
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            tracing::debug!("Ignoring unrecognized option {} in {}", key, path.display());
        }
        pairs.push((key, value));
    }
    Ok(recognized_only(pairs))
}

/// Folds layers given lowest precedence first; later layers win per key.
pub fn merge_layers<I>(layers: I) -> ConfigLayer
where
    I: IntoIterator<Item = ConfigLayer>,
{
    layers.into_iter().fold(ConfigLayer::new(), |mut merged, layer| {
        merged.extend(layer);
        merged
    })
}

/// `true` only for the word "true" in any letter case.
pub fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl RunConfiguration {
    /// Merges environment, default config file and extra config file (in rising
    /// precedence), fills defaults and validates the result.
    pub fn resolve(sources: &ConfigSources, keep_sql_flag: bool) -> Result<Self> {
        let mut layers = vec![sources.environment.clone()];

        let default_file = sources.program_dir.join(DEFAULT_CONFIG_FILE);
        if default_file.is_file() {
            layers.push(load_layer_from_file(&default_file).context("Failed to load default config")?);
        }
        if let Some(extra) = &sources.extra_config {
            layers.push(load_layer_from_file(extra).context("Failed to load --config file")?);
        }

        Self::from_layer(&merge_layers(layers), &sources.program_dir, keep_sql_flag)
    }

    /// Builds the configuration from an already merged layer.
    pub fn from_layer(layer: &ConfigLayer, program_dir: &Path, keep_sql_flag: bool) -> Result<Self> {
        // Empty means unset for everything but the password.
        let get = |key: &str| layer.get(key).map(String::as_str).filter(|v| !v.is_empty());

        let db_name = get("DB_NAME")
            .ok_or_else(|| BackupError::config("DB_NAME must be set"))?
            .to_string();

        let db_port = match get("DB_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                BackupError::config(format!("DB_PORT must be a port number (got {:?})", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let export_method = match get("EXPORT_METHOD") {
            Some(raw) => raw.parse::<ExportMethod>()?,
            None => ExportMethod::Full,
        };

        let output_root = get("OUTPUT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| program_dir.join(DEFAULT_OUTPUT_DIR));
        let log_file = get("LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_root.join(DEFAULT_LOG_FILE));

        let interpreter = find_interpreter(get("PYTHON_BIN"), program_dir)?;
        let exporter_script = get("EXPORTER_SCRIPT")
            .map(PathBuf::from)
            .unwrap_or_else(|| program_dir.join(DEFAULT_EXPORTER_SCRIPT));
        ensure_readable_file(&exporter_script)?;

        Ok(RunConfiguration {
            db_host: get("DB_HOST").unwrap_or(DEFAULT_HOST).to_string(),
            db_port,
            db_user: get("DB_USER").unwrap_or(DEFAULT_USER).to_string(),
            db_password: layer.get("DB_PASSWORD").cloned().map(Redacted::from),
            db_name,
            export_method,
            output_root,
            retention: Retention::parse(get("RETENTION_DAYS")),
            interpreter,
            exporter_script,
            additional_args: get("ADDITIONAL_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            log_file,
            keep_sql: keep_sql_flag || parse_bool(get("KEEP_SQL")),
            prompt_password: parse_bool(get("PROMPT_DB_PASSWORD")),
        })
    }

    /// One-line description for the run log. Never includes the password.
    pub fn summary(&self) -> String {
        format!(
            "database {} on {}@{}:{}, method {}, output {}, retention {}",
            self.db_name,
            self.db_user,
            self.db_host,
            self.db_port,
            self.export_method,
            self.output_root.display(),
            self.retention
        )
    }
}
