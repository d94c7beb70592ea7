//! PWM and tachometer access
//!
//! # PWM Values
//!
//! hwmon PWM values range from 0 to 255:
//! - 0 = fan off (or minimum speed on some fans)
//! - 255 = full speed
//!
//! fand exchanges percentages; conversion happens only when writing.

use std::fs;
use std::path::Path;

use fand_error::{FandError, Result};

use crate::constants::pwm;

/// Set PWM value directly (0-255)
pub fn set_pwm_value(pwm_path: &Path, value: u8) -> Result<()> {
    fs::write(pwm_path, value.to_string()).map_err(|e| {
        FandError::hardware(format!(
            "Failed to write PWM value {} to {}: {}",
            value,
            pwm_path.display(),
            e
        ))
    })
}

/// Set PWM as percentage (0.0-100.0)
pub fn set_pwm_percent(pwm_path: &Path, percent: f64) -> Result<()> {
    set_pwm_value(pwm_path, pwm::from_percent(percent))
}

/// Enable manual PWM control mode
///
/// PWM enable modes:
/// - 0 = disabled (no PWM output)
/// - 1 = manual (software control)
/// - 2+ = automatic (hardware thermal control)
pub fn enable_manual_pwm(enable_path: &Path) -> Result<()> {
    if !enable_path.exists() {
        // No enable file means manual control is always active
        return Ok(());
    }
    fs::write(enable_path, pwm::enable::MANUAL.to_string()).map_err(|e| {
        FandError::hardware(format!(
            "Failed to enable manual PWM control on {}: {}",
            enable_path.display(),
            e
        ))
    })
}

/// Read current fan speed in RPM
pub fn read_fan_rpm(fan_path: &Path) -> Result<u32> {
    let content = fs::read_to_string(fan_path).map_err(|e| {
        FandError::hardware(format!("Failed to read {}: {}", fan_path.display(), e))
    })?;
    content.trim().parse::<u32>().map_err(|e| {
        FandError::hardware(format!(
            "Failed to parse '{}' from {}: {}",
            content.trim(),
            fan_path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_pwm_value(pwm_path: &Path) -> u8 {
        fs::read_to_string(pwm_path).unwrap().trim().parse().unwrap()
    }

    #[test]
    fn test_pwm_write_read() {
        let dir = TempDir::new().unwrap();
        let pwm1 = dir.path().join("pwm1");
        fs::write(&pwm1, "0\n").unwrap();

        set_pwm_percent(&pwm1, 100.0).unwrap();
        assert_eq!(read_pwm_value(&pwm1), 255);
        set_pwm_percent(&pwm1, 40.0).unwrap();
        assert_eq!(read_pwm_value(&pwm1), 102);
    }

    #[test]
    fn test_enable_manual() {
        let dir = TempDir::new().unwrap();
        let enable = dir.path().join("pwm1_enable");

        // Absent enable file is fine
        enable_manual_pwm(&enable).unwrap();

        fs::write(&enable, "2\n").unwrap();
        enable_manual_pwm(&enable).unwrap();
        assert_eq!(fs::read_to_string(&enable).unwrap().trim(), "1");
    }

    #[test]
    fn test_read_fan_rpm() {
        let dir = TempDir::new().unwrap();
        let fan = dir.path().join("fan1_input");
        fs::write(&fan, "1250\n").unwrap();
        assert_eq!(read_fan_rpm(&fan).unwrap(), 1250);

        fs::write(&fan, "n/a\n").unwrap();
        assert!(matches!(read_fan_rpm(&fan), Err(FandError::Hardware(_))));
        assert!(read_fan_rpm(&dir.path().join("fan9_input")).is_err());
    }
}
