//! Hardware interaction
//!
//! The rest of the crate only sees [`Backend`] values handed out by a
//! [`Probe`]; `smartctl` and sysfs are touched exclusively from here.

pub mod control;
pub mod hardware;
pub mod probe;
pub mod smart;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::constants::shelf::CPU_SERIAL;

pub use control::{enable_manual_pwm, read_fan_rpm, set_pwm_percent, set_pwm_value};
pub use hardware::{find_chip, read_max_temperature};
pub use probe::{Probe, SystemProbe};

/// Device class used to pick a temperature curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceKind {
    None,
    Hdd,
    Ssd,
    Cpu,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 4] = [DeviceKind::None, DeviceKind::Hdd, DeviceKind::Ssd, DeviceKind::Cpu];
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::None => "NONE",
            DeviceKind::Hdd => "HDD",
            DeviceKind::Ssd => "SSD",
            DeviceKind::Cpu => "CPU",
        })
    }
}

/// A SMART-capable disk
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    /// Device node, e.g. `/dev/sda`
    pub node: String,
    /// Serial currently reported by the node; `None` once the disk is gone
    pub serial: Option<String>,
    /// Degrees Celsius
    pub temperature: f64,
}

/// Host CPU temperature source (hwmon `coretemp` chip)
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSensor {
    pub chip: PathBuf,
    /// Hottest core, degrees Celsius
    pub temperature: f64,
}

/// What a configured device is bound to on this system
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Backend {
    Hdd(Disk),
    Ssd(Disk),
    Cpu(CpuSensor),
    /// Device could not be located; reads as 0 °C
    #[default]
    None,
}

impl Backend {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Backend::Hdd(_) => DeviceKind::Hdd,
            Backend::Ssd(_) => DeviceKind::Ssd,
            Backend::Cpu(_) => DeviceKind::Cpu,
            Backend::None => DeviceKind::None,
        }
    }

    /// Serial of the hardware currently behind this backend
    pub fn serial(&self) -> Option<&str> {
        match self {
            Backend::Hdd(disk) | Backend::Ssd(disk) => disk.serial.as_deref(),
            Backend::Cpu(_) => Some(CPU_SERIAL),
            Backend::None => None,
        }
    }

    pub fn temperature(&self) -> f64 {
        match self {
            Backend::Hdd(disk) | Backend::Ssd(disk) => disk.temperature,
            Backend::Cpu(cpu) => cpu.temperature,
            Backend::None => 0.0,
        }
    }
}
