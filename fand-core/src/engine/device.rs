//! Configured temperature sources

use std::fmt;

use tracing::{debug, info};

use fand_error::Result;

use crate::hw::{Backend, DeviceKind, Probe};

/// A device a shelf takes its temperature from
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    serial: String,
    position: String,
    backend: Backend,
}

impl Device {
    /// Create a device and bind it to the hardware carrying `serial`
    pub fn new(serial: impl Into<String>, position: impl Into<String>, probe: &dyn Probe) -> Self {
        let serial = serial.into();
        let backend = probe.locate(&serial);
        let device = Self::with_backend(serial, position, backend);
        info!("New device {} created", device);
        device
    }

    pub fn with_backend(serial: impl Into<String>, position: impl Into<String>, backend: Backend) -> Self {
        Self {
            serial: serial.into(),
            position: position.into(),
            backend,
        }
    }

    /// Refresh readings, re-binding when the hardware no longer matches
    pub fn update(&mut self, probe: &dyn Probe) -> Result<()> {
        debug!("Updating device {}", self);
        probe.refresh(&mut self.backend)?;
        if self.backend.serial() != Some(self.serial.as_str()) {
            debug!("Device {} is not bound, searching again", self);
            self.backend = probe.locate(&self.serial);
        }
        Ok(())
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn kind(&self) -> DeviceKind {
        self.backend.kind()
    }

    pub fn temperature(&self) -> f64 {
        self.backend.temperature()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.serial, self.position)
    }
}
