//! Tracing/logging initialization.
//!
//! `RUST_LOG` always wins over the run mode's default filter.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("invalid log file path: {0}")]
    InvalidLogFile(PathBuf),

    #[error("log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),

    #[error("unknown run mode '{0}' (expected dev or release)")]
    UnknownRunMode(String),
}

/// Dev logs are human-readable at `debug`; release logs are JSON lines at `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Dev,
    Release,
}

impl RunMode {
    pub fn default_filter(self) -> &'static str {
        match self {
            Self::Dev => "debug",
            Self::Release => "info",
        }
    }
}

impl FromStr for RunMode {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "debug" => Ok(Self::Dev),
            "release" | "prod" => Ok(Self::Release),
            other => Err(ObservabilityError::UnknownRunMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub run_mode: RunMode,
    /// Daily-rolling log file, written in addition to stdout.
    pub file: Option<PathBuf>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn filter(run_mode: RunMode) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(run_mode.default_filter()))
}

/// Appender rotating daily next to `path`; creates the directory if needed.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, ObservabilityError> {
    let name = path
        .file_name()
        .ok_or_else(|| ObservabilityError::InvalidLogFile(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    Ok(rolling::daily(dir, name))
}

fn layers(settings: &LogSettings) -> Result<Vec<BoxedLayer>, ObservabilityError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stdout = match settings.run_mode {
        RunMode::Dev => fmt::layer().with_target(true).with_filter(filter(settings.run_mode)).boxed(),
        RunMode::Release => fmt::layer()
            .json()
            .with_target(false)
            .with_filter(filter(settings.run_mode))
            .boxed(),
    };
    layers.push(stdout);

    if let Some(path) = &settings.file {
        let writer = file_appender(path)?;
        let file = match settings.run_mode {
            RunMode::Dev => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(settings.run_mode))
                .boxed(),
            RunMode::Release => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(false)
                .with_filter(filter(settings.run_mode))
                .boxed(),
        };
        layers.push(file);
    }

    Ok(layers)
}

/// Install the process-wide subscriber.
///
/// Fails with `AlreadyInitialized` when one is already set (e.g. by a test).
pub fn init(settings: &LogSettings) -> Result<(), ObservabilityError> {
    tracing_subscriber::registry()
        .with(layers(settings)?)
        .try_init()
        .map_err(|e| ObservabilityError::AlreadyInitialized(e.to_string()))
}
