//! Shelf control state
//!
//! A shelf is in one of two states:
//!
//! - **Base**: `pwm` reads the value computed by the last control update.
//! - **Overridden**: an operator override is set and either has no expiry or
//!   the expiry is still in the future; `pwm` reads the override.
//!
//! Expiry is evaluated lazily on each read; nothing runs when it elapses.
//! Control updates only ever write the base value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use fand_error::{FandError, Result};

use crate::constants::shelf::{INITIAL_PWM, INITIAL_RPM, MAX_PWM, MIN_PWM};
use crate::data::ShelfConfig;
use crate::engine::curve::CurveSet;
use crate::engine::device::Device;
use crate::hw::{DeviceKind, Probe};

/// Values shared between the control thread and client handlers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShelfState {
    pub rpm: f64,
    /// Base value from the last control update
    pub pwm: f64,
    pub pwm_override: Option<f64>,
    pub pwm_expire: Option<DateTime<FixedOffset>>,
}

impl Default for ShelfState {
    fn default() -> Self {
        Self {
            rpm: INITIAL_RPM,
            pwm: INITIAL_PWM,
            pwm_override: None,
            pwm_expire: None,
        }
    }
}

impl ShelfState {
    /// PWM in effect at `now`
    pub fn effective_pwm(&self, now: DateTime<Utc>) -> f64 {
        match (self.pwm_override, self.pwm_expire) {
            (Some(value), None) => value,
            (Some(value), Some(expire)) if expire > now => value,
            _ => self.pwm,
        }
    }
}

/// A physical enclosure with its own fan
pub struct Shelf {
    id: String,
    sleep_time: Duration,
    curves: CurveSet,
    devices: Mutex<Vec<Device>>,
    state: Mutex<ShelfState>,
}

impl Shelf {
    /// Create a shelf; devices sharing a serial are kept once
    pub fn new(id: impl Into<String>, devices: Vec<Device>, curves: CurveSet, sleep_time: Duration) -> Self {
        let id = id.into();
        debug!("Creating new shelf {}", id);

        let mut unique: Vec<Device> = Vec::with_capacity(devices.len());
        for device in devices {
            if unique.iter().any(|d| d.serial() == device.serial()) {
                warn!("Shelf {}: ignoring duplicate device {}", id, device);
                continue;
            }
            unique.push(device);
        }

        Self {
            id,
            sleep_time,
            curves,
            devices: Mutex::new(unique),
            state: Mutex::new(ShelfState::default()),
        }
    }

    /// Build a shelf from its configuration
    ///
    /// Curves are validated before any device is located, so an invalid
    /// configuration never touches the hardware.
    pub fn from_config(config: &ShelfConfig, probe: &dyn Probe) -> Result<Self> {
        let curves = config.curves()?;
        let devices = config
            .devices
            .iter()
            .map(|d| Device::new(d.serial.as_str(), d.position.as_str(), probe))
            .collect();
        Ok(Self::new(config.id.as_str(), devices, curves, config.sleep_time()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    /// Consistent copy of the shared values
    pub fn snapshot(&self) -> ShelfState {
        *self.state.lock()
    }

    pub fn rpm(&self) -> f64 {
        self.state.lock().rpm
    }

    /// Effective PWM (override or base)
    pub fn pwm(&self) -> f64 {
        self.pwm_at(Utc::now())
    }

    pub fn pwm_at(&self, now: DateTime<Utc>) -> f64 {
        self.state.lock().effective_pwm(now)
    }

    pub fn base_pwm(&self) -> f64 {
        self.state.lock().pwm
    }

    pub fn pwm_override(&self) -> Option<f64> {
        self.state.lock().pwm_override
    }

    pub fn pwm_expire(&self) -> Option<DateTime<FixedOffset>> {
        self.state.lock().pwm_expire
    }

    pub fn set_rpm(&self, rpm: f64) -> Result<()> {
        if rpm.is_nan() || rpm < 0.0 {
            return Err(FandError::invalid_value("RPM cannot be below zero"));
        }
        if rpm.is_infinite() {
            return Err(FandError::invalid_value("RPM must be finite"));
        }
        self.state.lock().rpm = rpm;
        Ok(())
    }

    /// Set or clear the operator override
    pub fn set_pwm_override(&self, value: Option<f64>) -> Result<()> {
        if let Some(value) = value {
            if !(MIN_PWM..=MAX_PWM).contains(&value) {
                return Err(FandError::invalid_value(format!(
                    "PWM must be between {MIN_PWM} and {MAX_PWM}"
                )));
            }
        }
        self.state.lock().pwm_override = value;
        Ok(())
    }

    /// Set or clear the override expiration
    ///
    /// Naive dates must be localized before reaching here
    /// (see [`fand_protocol::localize`]).
    pub fn set_pwm_expire(&self, expire: Option<DateTime<FixedOffset>>) -> Result<()> {
        self.set_pwm_expire_at(expire, Utc::now())
    }

    pub fn set_pwm_expire_at(&self, expire: Option<DateTime<FixedOffset>>, now: DateTime<Utc>) -> Result<()> {
        if let Some(expire) = expire {
            if expire < now {
                return Err(FandError::ExpiredTimestamp {
                    expire: expire.to_rfc3339(),
                    now: now.with_timezone(expire.offset()).to_rfc3339(),
                });
            }
        }
        self.state.lock().pwm_expire = expire;
        Ok(())
    }

    /// Recompute the base PWM from device temperatures
    ///
    /// Returns the new base value.
    pub fn update(&self, probe: &dyn Probe) -> Result<f64> {
        info!("Updating shelf {}", self.id);

        let mut effective: HashMap<DeviceKind, f64> =
            DeviceKind::ALL.iter().map(|&kind| (kind, 0.0)).collect();
        {
            let mut devices = self.devices.lock();
            let mut seen: HashMap<DeviceKind, f64> = HashMap::new();
            for device in devices.iter_mut() {
                device.update(probe)?;
                if device.kind() == DeviceKind::None {
                    continue;
                }
                let temp = seen.entry(device.kind()).or_insert(f64::NEG_INFINITY);
                *temp = temp.max(device.temperature());
            }
            effective.extend(seen);
        }
        debug!("Effective temperatures for {}: {:?}", self.id, effective);

        let pwm = DeviceKind::ALL
            .iter()
            .map(|&kind| self.curves.for_kind(kind).speed_at(effective[&kind]))
            .fold(MIN_PWM, f64::max);

        self.state.lock().pwm = pwm;
        info!("PWM speed for shelf {} is {}", self.id, pwm);
        Ok(pwm)
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }
}

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl fmt::Debug for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelf")
            .field("id", &self.id)
            .field("sleep_time", &self.sleep_time)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Shelves by identifier, built once before any worker starts
#[derive(Debug, Default)]
pub struct ShelfRegistry {
    shelves: HashMap<String, Arc<Shelf>>,
}

impl ShelfRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shelf: Shelf) -> Result<()> {
        if self.shelves.contains_key(shelf.id()) {
            return Err(FandError::config(format!("Duplicate shelf {}", shelf.id())));
        }
        self.shelves.insert(shelf.id().to_string(), Arc::new(shelf));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Arc<Shelf>> {
        self.shelves
            .get(id)
            .ok_or_else(|| FandError::ShelfNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Shelf>> {
        self.shelves.values()
    }

    pub fn len(&self) -> usize {
        self.shelves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shelves.is_empty()
    }
}
