//! hwmon chip lookup and temperature reading
//!
//! # Sensor Files
//!
//! - `name`: chip driver name (`coretemp`, `nct6775`, ...)
//! - `tempN_input`: temperature in millidegrees Celsius

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use fand_error::{FandError, Result};

use crate::constants::hardware::MILLIDEGREE_DIVISOR;

/// Find the first hwmon chip whose `name` file matches `name`
pub fn find_chip(hwmon_base: &Path, name: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(hwmon_base) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot scan {:?}: {}", hwmon_base, e);
            return None;
        }
    };

    let mut chips: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    chips.sort();

    chips.into_iter().find(|chip| {
        let found = read_trimmed(&chip.join("name")).as_deref() == Some(name);
        trace!(path = ?chip, found, "Checked hwmon chip");
        found
    })
}

/// Hottest `tempN_input` reading of a chip, in degrees Celsius
pub fn read_max_temperature(chip: &Path) -> Result<f64> {
    let entries = fs::read_dir(chip)
        .map_err(|e| FandError::hardware(format!("Cannot read {}: {}", chip.display(), e)))?;

    let mut hottest: Option<f64> = None;
    for entry in entries.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !(file_name.starts_with("temp") && file_name.ends_with("_input")) {
            continue;
        }
        let Some(raw) = read_trimmed(&entry.path()) else {
            continue;
        };
        match raw.parse::<i64>() {
            Ok(millidegrees) => {
                let celsius = millidegrees as f64 / MILLIDEGREE_DIVISOR;
                hottest = Some(hottest.map_or(celsius, |t| t.max(celsius)));
            }
            Err(_) => trace!("Ignoring unparsable {}: {:?}", file_name, raw),
        }
    }

    hottest.ok_or_else(|| {
        FandError::hardware(format!("No temperature sensor in {}", chip.display()))
    })
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
