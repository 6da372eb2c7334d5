//! Process-wide tracing setup for the server binary.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::ValueEnum;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Default filter directives for this level. Debug and trace only
    /// open up the workspace crates; dependency noise stays at info.
    fn directives(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "info,reef=debug,reef_bus=debug",
            LogLevel::Trace => "info,reef=trace,reef_bus=trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("cannot open log file {path:?}: {source}")]
    LogFile { path: PathBuf, source: io::Error },
    #[error("logger already installed: {0}")]
    Install(String),
}

// Keeps the non-blocking writer alive for the process lifetime; also
// marks the subscriber as installed.
static APPENDER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops; the first
/// configuration wins. `REEF_LOG_FILTER` overrides the level-derived
/// filter entirely.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if APPENDER_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = match std::env::var("REEF_LOG_FILTER") {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new(config.level.directives()),
    };

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Install(err.to_string()))?;

    let _ = APPENDER_GUARD.set(guard);
    Ok(())
}
