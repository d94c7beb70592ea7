/*
 * This file is part of fand.
 *
 * Copyright (C) 2025 fand contributors
 *
 * fand is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * fand is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with fand. If not, see <https://www.gnu.org/licenses/>.
 */

//! hwmon fan actuators for the agent
//!
//! A PWM channel is a `pwmN` file taking 0-255; its `pwmN_enable` sibling,
//! when present, is switched to manual mode before the first write. The
//! tachometer is a `fanN_input` file in RPM.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use fand_core::hw::control;
use fand_error::Result;

/// Something that turns a PWM percentage into fan speed
#[cfg_attr(test, mockall::automock)]
pub trait PwmActuator {
    fn apply(&mut self, percent: f64) -> Result<()>;
}

/// Something that measures fan speed
#[cfg_attr(test, mockall::automock)]
pub trait RpmSensor {
    fn read_rpm(&mut self) -> Result<f64>;
}

/// `pwmN` -> `pwmN_enable`
fn enable_path_for(pwm_path: &Path) -> PathBuf {
    let mut name = pwm_path.file_name().unwrap_or_default().to_os_string();
    name.push("_enable");
    pwm_path.with_file_name(name)
}

pub struct HwmonPwm {
    path: PathBuf,
    enable_path: PathBuf,
    manual: bool,
}

impl HwmonPwm {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let enable_path = enable_path_for(&path);
        Self {
            path,
            enable_path,
            manual: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PwmActuator for HwmonPwm {
    fn apply(&mut self, percent: f64) -> Result<()> {
        if !self.manual {
            control::enable_manual_pwm(&self.enable_path)?;
            info!("Manual PWM control enabled on {}", self.path.display());
            self.manual = true;
        }
        debug!("Setting {} to {}%", self.path.display(), percent);
        control::set_pwm_percent(&self.path, percent)
    }
}

pub struct HwmonTach {
    path: PathBuf,
}

impl HwmonTach {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RpmSensor for HwmonTach {
    fn read_rpm(&mut self) -> Result<f64> {
        control::read_fan_rpm(&self.path).map(f64::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fand_error::FandError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_enable_path() {
        assert_eq!(
            enable_path_for(Path::new("/sys/class/hwmon/hwmon2/pwm1")),
            PathBuf::from("/sys/class/hwmon/hwmon2/pwm1_enable")
        );
    }

    #[test]
    fn test_apply_scales_and_enables() {
        let dir = TempDir::new().unwrap();
        let pwm = dir.path().join("pwm1");
        fs::write(&pwm, "0").unwrap();
        fs::write(dir.path().join("pwm1_enable"), "2").unwrap();

        let mut actuator = HwmonPwm::new(&pwm);
        actuator.apply(50.0).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "128");
        assert_eq!(fs::read_to_string(dir.path().join("pwm1_enable")).unwrap(), "1");

        actuator.apply(100.0).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "255");
        actuator.apply(0.0).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "0");
    }

    #[test]
    fn test_apply_without_enable_file() {
        let dir = TempDir::new().unwrap();
        let pwm = dir.path().join("pwm2");
        fs::write(&pwm, "0").unwrap();
        HwmonPwm::new(&pwm).apply(25.0).unwrap();
        assert_eq!(fs::read_to_string(&pwm).unwrap(), "64");
    }

    #[test]
    fn test_apply_missing_channel() {
        let dir = TempDir::new().unwrap();
        let mut actuator = HwmonPwm::new(dir.path().join("nested").join("pwm1"));
        assert!(matches!(actuator.apply(10.0), Err(FandError::Hardware(_))));
    }

    #[test]
    fn test_tachometer() {
        let dir = TempDir::new().unwrap();
        let fan = dir.path().join("fan1_input");
        fs::write(&fan, "1200\n").unwrap();
        assert_eq!(HwmonTach::new(&fan).read_rpm().unwrap(), 1200.0);

        let mut missing = HwmonTach::new(dir.path().join("fan9_input"));
        assert!(matches!(missing.read_rpm(), Err(FandError::Hardware(_))));
    }
}
