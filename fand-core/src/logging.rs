//! Logging setup
//!
//! Destination, in order of preference: the log file given on the command
//! line, the systemd journal (daemon only, when its socket exists), stderr.
//! `FAND_LOG` overrides the level chosen from `-v`/`-q`.

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use fand_error::{FandError, Result};

use crate::constants::{logging::LOG_ENV, paths::JOURNALD_SOCKET};

/// Where log records end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    File(PathBuf),
    Journald,
    Stderr,
}

impl fmt::Display for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::File(path) => write!(f, "{}", path.display()),
            LogSink::Journald => f.write_str("systemd journal"),
            LogSink::Stderr => f.write_str("stderr"),
        }
    }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn init_error(e: impl fmt::Display) -> FandError {
    FandError::config(format!("Cannot initialize logging: {e}"))
}

/// Install the global subscriber
pub fn init_logging(level: LevelFilter, logfile: Option<&Path>, prefer_journald: bool) -> Result<LogSink> {
    if let Some(path) = logfile {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| FandError::config(format!("Cannot open log file {}: {}", path.display(), e)))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(level))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(init_error)?;
        return Ok(LogSink::File(path.to_path_buf()));
    }

    if prefer_journald && Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(env_filter(level))
                    .try_init()
                    .map_err(init_error)?;
                return Ok(LogSink::Journald);
            }
            Err(e) => {
                // No subscriber yet, so this can only go to stderr
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(init_error)?;
    Ok(LogSink::Stderr)
}
