//! `smartctl --json` output parsing
//!
//! smartctl exit codes are a bitmask that is non-zero for healthy disks with
//! logged errors, so success is judged from the JSON body alone.

use serde::Deserialize;

use fand_error::{FandError, Result};

#[derive(Debug, Deserialize)]
struct ScanOutput {
    #[serde(default)]
    devices: Vec<ScanEntry>,
}

#[derive(Debug, Deserialize)]
struct ScanEntry {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct InfoDevice {
    #[serde(default)]
    protocol: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct InfoTemperature {
    current: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InfoOutput {
    serial_number: Option<String>,
    rotation_rate: Option<u64>,
    #[serde(default)]
    device: InfoDevice,
    temperature: Option<InfoTemperature>,
}

/// Identity and temperature of one disk
#[derive(Debug, Clone, PartialEq)]
pub struct SmartInfo {
    pub serial: String,
    pub is_ssd: bool,
    pub temperature: Option<f64>,
}

/// Device nodes listed by `smartctl --scan -j`
pub fn parse_scan(json: &str) -> Result<Vec<String>> {
    let scan: ScanOutput = serde_json::from_str(json)
        .map_err(|e| FandError::hardware(format!("Cannot parse smartctl scan: {e}")))?;
    Ok(scan.devices.into_iter().map(|d| d.name).collect())
}

/// Parse `smartctl --json -i -A <node>`
///
/// Returns `None` when the output does not describe a disk with a serial,
/// which is what a vanished node produces.
pub fn parse_info(json: &str) -> Option<SmartInfo> {
    let info: InfoOutput = serde_json::from_str(json).ok()?;
    let serial = info.serial_number?.trim().to_string();
    if serial.is_empty() {
        return None;
    }
    let is_nvme = info.device.protocol.eq_ignore_ascii_case("nvme")
        || info.device.kind.eq_ignore_ascii_case("nvme");
    Some(SmartInfo {
        serial,
        is_ssd: is_nvme || info.rotation_rate == Some(0),
        temperature: info.temperature.and_then(|t| t.current),
    })
}
