//! Locating configured devices on the running system

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, error, warn};

use fand_error::{FandError, Result};

use crate::constants::{hardware, paths, shelf::CPU_SERIAL};
use crate::hw::hardware::{find_chip, read_max_temperature};
use crate::hw::smart::{self, SmartInfo};
use crate::hw::{Backend, CpuSensor, Disk};

/// Hardware boundary used by shelves
#[cfg_attr(test, mockall::automock)]
pub trait Probe: Send + Sync {
    /// Resolve a configured serial; [`Backend::None`] if it cannot be found
    fn locate(&self, serial: &str) -> Backend;

    /// Re-read the backend's serial and temperature
    fn refresh(&self, backend: &mut Backend) -> Result<()>;
}

/// Probe backed by `smartctl` and the hwmon `coretemp` chip
#[derive(Debug, Clone)]
pub struct SystemProbe {
    hwmon_base: PathBuf,
    smartctl: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::with_paths(paths::HWMON_BASE, hardware::SMARTCTL)
    }

    pub fn with_paths(hwmon_base: impl Into<PathBuf>, smartctl: impl Into<PathBuf>) -> Self {
        Self {
            hwmon_base: hwmon_base.into(),
            smartctl: smartctl.into(),
        }
    }

    fn smartctl(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.smartctl).args(args).output().map_err(|e| {
            FandError::hardware(format!("Cannot run {}: {}", self.smartctl.display(), e))
        })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn scan(&self) -> Result<Vec<String>> {
        smart::parse_scan(&self.smartctl(&["--scan", "-j"])?)
    }

    fn query(&self, node: &str) -> Result<Option<SmartInfo>> {
        Ok(smart::parse_info(&self.smartctl(&["--json", "-i", "-A", node])?))
    }

    fn locate_cpu(&self) -> Backend {
        match find_chip(&self.hwmon_base, hardware::CORETEMP_CHIP) {
            Some(chip) => {
                debug!("Identified host CPU at {}", chip.display());
                let temperature = read_max_temperature(&chip).unwrap_or(0.0);
                Backend::Cpu(CpuSensor { chip, temperature })
            }
            None => {
                debug!("Cannot access CPU information");
                Backend::None
            }
        }
    }

    fn locate_disk(&self, serial: &str) -> Result<Backend> {
        for node in self.scan()? {
            let Some(info) = self.query(&node)? else {
                continue;
            };
            if info.serial != serial {
                continue;
            }
            let disk = Disk {
                node,
                serial: Some(info.serial),
                temperature: info.temperature.unwrap_or(0.0),
            };
            return Ok(if info.is_ssd {
                debug!("Identified SSD {}", serial);
                Backend::Ssd(disk)
            } else {
                debug!("Identified HDD {}", serial);
                Backend::Hdd(disk)
            });
        }
        Ok(Backend::None)
    }
}

impl Probe for SystemProbe {
    fn locate(&self, serial: &str) -> Backend {
        if serial == CPU_SERIAL {
            return self.locate_cpu();
        }
        match self.locate_disk(serial) {
            Ok(Backend::None) => {
                error!("Device not found: {}", serial);
                Backend::None
            }
            Ok(backend) => backend,
            Err(e) => {
                error!("Cannot search for device {}: {}", serial, e);
                Backend::None
            }
        }
    }

    fn refresh(&self, backend: &mut Backend) -> Result<()> {
        match backend {
            Backend::Hdd(disk) | Backend::Ssd(disk) => match self.query(&disk.node)? {
                Some(info) => {
                    if info.temperature.is_none() {
                        warn!("{} reports no temperature", disk.node);
                    }
                    disk.serial = Some(info.serial);
                    disk.temperature = info.temperature.unwrap_or(0.0);
                }
                None => {
                    warn!("Lost disk at {}", disk.node);
                    disk.serial = None;
                }
            },
            Backend::Cpu(cpu) => cpu.temperature = read_max_temperature(&cpu.chip)?,
            Backend::None => {}
        }
        Ok(())
    }
}
