//! Constants and configuration values for fand
//!
//! Centralizes magic numbers, paths and defaults shared by the server, the
//! agent and fanctl.

use std::time::Duration;

/// Filesystem locations
pub mod paths {
    /// Base path for hwmon devices
    pub const HWMON_BASE: &str = "/sys/class/hwmon";

    /// Environment variable naming the configuration file
    pub const CONFIG_ENV: &str = "FAND_CONFIG";

    /// Configuration file looked up in the working directory
    pub const LOCAL_CONFIG: &str = "./fand.json";

    /// System-wide configuration file
    pub const SYSTEM_CONFIG: &str = "/etc/fand.json";

    /// Present when systemd-journald accepts native log records
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Shelf state defaults and limits
pub mod shelf {
    use super::Duration;

    /// Base PWM before the first control update (full speed)
    pub const INITIAL_PWM: f64 = 100.0;

    pub const INITIAL_RPM: f64 = 0.0;

    pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_secs(60);

    pub const MIN_PWM: f64 = 0.0;
    pub const MAX_PWM: f64 = 100.0;

    /// Device serial designating the host CPU
    pub const CPU_SERIAL: &str = "cpu";
}

/// Hardware probing
pub mod hardware {
    pub const SMARTCTL: &str = "smartctl";

    /// hwmon chip exposing per-core CPU temperatures
    pub const CORETEMP_CHIP: &str = "coretemp";

    /// hwmon reports temperatures in millidegrees Celsius
    pub const MILLIDEGREE_DIVISOR: f64 = 1000.0;
}

/// TCP settings
pub mod network {
    use super::Duration;

    pub use fand_protocol::{CLIENT_TIMEOUT, DEFAULT_PORT};

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long a close waits for a reply in flight before skipping DISCONNECT
    pub const CLOSE_NOTIFY_WAIT: Duration = Duration::from_secs(1);
}

/// PWM channel scaling used by the agent
pub mod pwm {
    /// Maximum raw hwmon PWM value
    pub const MAX_VALUE: u8 = 255;

    /// `pwmN_enable` modes
    pub mod enable {
        pub const MANUAL: u8 = 1;
    }

    /// Convert a percentage (0-100) to a raw PWM value (0-255)
    #[inline]
    pub fn from_percent(percent: f64) -> u8 {
        let clamped = percent.clamp(0.0, 100.0);
        (clamped / 100.0 * MAX_VALUE as f64).round() as u8
    }
}

/// Agent loop timing
pub mod agent {
    use super::Duration;

    /// Delay between applying PWM and reading the tachometer
    pub const PWM_SETTLE: Duration = Duration::from_secs(1);

    /// Delay between two reporting rounds
    pub const REPORT_INTERVAL: Duration = Duration::from_secs(60);
}

/// Logging
pub mod logging {
    /// Environment variable overriding the level filter
    pub const LOG_ENV: &str = "FAND_LOG";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pwm_from_percent() {
        assert_eq!(pwm::from_percent(0.0), 0);
        assert_eq!(pwm::from_percent(50.0), 128);
        assert_eq!(pwm::from_percent(100.0), 255);
        assert_eq!(pwm::from_percent(150.0), 255);
        assert_eq!(pwm::from_percent(-3.0), 0);
    }
}
