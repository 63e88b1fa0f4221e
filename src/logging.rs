//! Tracing setup for the CLI.
//!
//! While the questionnaire is on screen, log lines would interleave with prompts, so
//! `run` writes them to a per-run file under `{state}/logs`. `status`, `reset` and
//! `serve-stub` log to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Keeps the file writer alive; dropping it flushes buffered lines
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,
    /// Set when this run logs to a file
    pub log_file_path: Option<PathBuf>,
}

/// Where a run sends its log lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    File { dir: PathBuf, file_name: String },
    Stderr,
}

impl LogSink {
    /// Pick the sink for a run. `questionnaire` is true when prompts own the terminal.
    pub fn for_run(config: &Config, questionnaire: bool) -> Self {
        if questionnaire && config.logging.to_file {
            let started = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
            LogSink::File {
                dir: config.logs_path(),
                file_name: format!("scholar-wizard-{}.log", started),
            }
        } else {
            LogSink::Stderr
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        match self {
            LogSink::File { dir, file_name } => Some(dir.join(file_name)),
            LogSink::Stderr => None,
        }
    }
}

/// Level from `--debug`, else the configured level. `RUST_LOG` wins over both.
fn filter(config: &Config, debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { config.logging.level.as_str() };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Call once, before the wizard is mounted.
pub fn init_logging(config: &Config, questionnaire: bool, debug: bool) -> Result<LoggingHandle> {
    let sink = LogSink::for_run(config, questionnaire);
    let log_file_path = sink.path();
    let registry = tracing_subscriber::registry().with(filter(config, debug));

    match sink {
        LogSink::File { dir, file_name } => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, &file_name));
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(LoggingHandle {
                _guard: Some(guard),
                log_file_path,
            })
        }
        LogSink::Stderr => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
            Ok(LoggingHandle {
                _guard: None,
                log_file_path,
            })
        }
    }
}
