//! Run log: every line is `[YYYY-MM-DD HH:MM:SS] <message>`, written to the
//! console and, once the configuration names one, appended to a log file.
//!
//! The console sink exists from process start. The file sink is attached
//! through a reload handle after the configuration is resolved, since the log
//! path is itself configuration.

use anyhow::Context;
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{Event, Subscriber, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Registry, reload};

pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats an event as `[timestamp] message`, with no level or target, so the
/// console and file lines are identical.
pub struct RunLineFormat;

impl<S, N> FormatEvent<S, N> for RunLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "[{}] ", Local::now().format(LOG_TIMESTAMP_FORMAT))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

type FileLayer = fmt::Layer<Registry, DefaultFields, RunLineFormat, Mutex<File>>;

/// Handle on the process-wide run log.
pub struct RunLogger {
    file_sink: reload::Handle<Option<FileLayer>, Registry>,
}

impl RunLogger {
    /// Installs the global subscriber (INFO and above) with the console sink only.
    pub fn init() -> anyhow::Result<Self> {
        let (file_layer, file_sink) = reload::Layer::new(None::<FileLayer>);
        tracing_subscriber::registry()
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .event_format(RunLineFormat)
                    .with_writer(std::io::stdout),
            )
            .with(LevelFilter::INFO)
            .try_init()
            .context("Failed to install the run logger")?;
        Ok(RunLogger { file_sink })
    }

    /// Starts appending every log line to `path` as well.
    ///
    /// Best effort: if the file cannot be opened the run carries on with the
    /// console sink alone.
    pub fn attach_file(&self, path: &Path) {
        let attached = open_log_file(path)
            .and_then(|file| {
                self.file_sink
                    .reload(Some(file_layer(file)))
                    .context("Failed to attach the log file sink")
            });
        if let Err(e) = attached {
            warn!(
                "⚠️ Log file {} is unavailable, logging to console only: {:#}",
                path.display(),
                e
            );
        }
    }
}

fn file_layer(file: File) -> FileLayer {
    fmt::Layer::default()
        .with_ansi(false)
        .event_format(RunLineFormat)
        .with_writer(Mutex::new(file))
}

/// Opens `path` for appending, creating its parent directory on first use.
fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create log directory: {}", parent.display())
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tracing::info;

    #[test]
    fn test_file_sink_writes_timestamped_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("nested").join("backup.log");
        let file = open_log_file(&log_path)?;

        let subscriber = tracing_subscriber::registry().with(Some(file_layer(file)));
        tracing::subscriber::with_default(subscriber, || {
            info!("first line");
            warn!("second line for {}", "testdb");
        });

        let content = std::fs::read_to_string(&log_path)?;
        let line = Regex::new(r"^\[\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\] (.*)$")?;
        let messages: Vec<String> = content
            .lines()
            .map(|l| line.captures(l).map(|c| c[1].to_string()).unwrap_or_default())
            .collect();
        assert_eq!(messages, vec!["first line", "second line for testdb"]);
        Ok(())
    }

    #[test]
    fn test_open_log_file_appends() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("backup.log");
        std::fs::write(&log_path, "existing\n")?;

        let file = open_log_file(&log_path)?;
        let subscriber = tracing_subscriber::registry().with(Some(file_layer(file)));
        tracing::subscriber::with_default(subscriber, || info!("appended"));

        let content = std::fs::read_to_string(&log_path)?;
        assert!(content.starts_with("existing\n"));
        assert!(content.trim_end().ends_with("appended"));
        Ok(())
    }

    #[test]
    fn test_open_log_file_fails_when_parent_is_a_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "")?;
        assert!(open_log_file(&blocker.join("backup.log")).is_err());
        Ok(())
    }
}
