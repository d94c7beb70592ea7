//! Server configuration
//!
//! JSON file describing the shelves to monitor. Looked up in order:
//! explicit path, `FAND_CONFIG`, `./fand.json`, `/etc/fand.json`.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fand_error::{FandError, Result};

use crate::constants::{paths, shelf::DEFAULT_SLEEP_TIME};
use crate::engine::curve::{CurveSet, TemperatureCurve};
use crate::hw::DeviceKind;

/// Curve as written in the file: `{"temperature": speed}`
pub type CurveConfig = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub serial: String,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfConfig {
    pub id: String,
    /// Seconds between two control updates
    #[serde(default = "default_sleep_time")]
    pub sleep_time: f64,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub hdd_temps: Option<CurveConfig>,
    #[serde(default)]
    pub ssd_temps: Option<CurveConfig>,
    #[serde(default)]
    pub cpu_temps: Option<CurveConfig>,
}

fn default_sleep_time() -> f64 {
    DEFAULT_SLEEP_TIME.as_secs_f64()
}

impl ShelfConfig {
    pub fn sleep_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.sleep_time).unwrap_or(DEFAULT_SLEEP_TIME)
    }

    /// Validated curves; classes without a curve use `{0: 0}`
    pub fn curves(&self) -> Result<CurveSet> {
        Ok(CurveSet::new(
            build_curve(DeviceKind::Hdd, self.hdd_temps.as_ref())?,
            build_curve(DeviceKind::Ssd, self.ssd_temps.as_ref())?,
            build_curve(DeviceKind::Cpu, self.cpu_temps.as_ref())?,
        ))
    }
}

fn build_curve(kind: DeviceKind, config: Option<&CurveConfig>) -> Result<TemperatureCurve> {
    let Some(config) = config else {
        return Ok(TemperatureCurve::idle());
    };
    let mut points = Vec::with_capacity(config.len());
    for (key, &speed) in config {
        let temp = key.trim().parse::<f64>().map_err(|_| FandError::InvalidCurve {
            class: kind.to_string(),
            reason: format!("'{key}' is not a temperature"),
        })?;
        points.push((temp, speed));
    }
    TemperatureCurve::new(kind, points)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub shelves: Vec<ShelfConfig>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| FandError::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without hardware
    pub fn validate(&self) -> Result<()> {
        if self.shelves.is_empty() {
            return Err(FandError::config("No shelf configured"));
        }
        let mut seen = HashSet::new();
        for shelf in &self.shelves {
            if shelf.id.trim().is_empty() {
                return Err(FandError::config("Shelf with an empty id"));
            }
            if !seen.insert(shelf.id.as_str()) {
                return Err(FandError::config(format!("Duplicate shelf {}", shelf.id)));
            }
            if !shelf.sleep_time.is_finite() || shelf.sleep_time <= 0.0 {
                return Err(FandError::config(format!(
                    "Shelf {}: sleep_time must be a positive number of seconds",
                    shelf.id
                )));
            }
            shelf
                .curves()
                .map_err(|e| FandError::config(format!("Shelf {}: {}", shelf.id, e)))?;
        }
        Ok(())
    }
}

/// Pick the configuration file
///
/// `env` is the value of `FAND_CONFIG`; `candidates` are tried in order and
/// only returned if they exist.
pub fn resolve_config_path(explicit: Option<&Path>, env: Option<OsString>, candidates: &[&Path]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    candidates.iter().find(|p| p.is_file()).map(|p| p.to_path_buf())
}

/// Find the configuration file using the standard lookup order
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_config_path(
        explicit,
        std::env::var_os(paths::CONFIG_ENV),
        &[Path::new(paths::LOCAL_CONFIG), Path::new(paths::SYSTEM_CONFIG)],
    )
}

/// Read and validate a configuration file
pub fn read_config(path: &Path) -> Result<Config> {
    debug!("Reading configuration {}", path.display());
    let json = fs::read_to_string(path)
        .map_err(|e| FandError::config(format!("Cannot read {}: {}", path.display(), e)))?;
    let config = Config::from_json(&json)?;
    info!("Loaded {} shelf configuration(s) from {}", config.shelves.len(), path.display());
    Ok(config)
}

/// Locate, read and validate the configuration
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = find_config_file(explicit).ok_or(FandError::MissingConfig)?;
    read_config(&path)
}
