use std::fs;
use std::path::{Path, PathBuf};

use super::{ChargingState, PowerSource, ReadError};

const INFO_PATH: &str = "/proc/acpi/battery/BAT1/info";
const STATE_PATH: &str = "/proc/acpi/battery/BAT1/state";

const FIELD_DESIGN_LOW: &str = "design capacity low";
const FIELD_REMAINING: &str = "remaining capacity";
const FIELD_PRESENT_RATE: &str = "present rate";
const FIELD_PRESENT: &str = "present";
const FIELD_STATE: &str = "charging state";

/// Reads the two-record procfs battery interface.
///
/// Each record is a sequence of `<field name>:<whitespace><value>`
/// lines; the value is the first whitespace-separated token after the
/// colon (units like `mWh` follow and are ignored).
#[derive(Debug, Clone)]
pub struct ProcPowerSource {
    info_path: PathBuf,
    state_path: PathBuf,
}

impl ProcPowerSource {
    pub fn new() -> Self {
        Self {
            info_path: INFO_PATH.into(),
            state_path: STATE_PATH.into(),
        }
    }

    /// Read from non-default record locations. Used by tests.
    pub fn with_paths(info: impl Into<PathBuf>, state: impl Into<PathBuf>) -> Self {
        Self {
            info_path: info.into(),
            state_path: state.into(),
        }
    }

    fn present(&self) -> bool {
        matches!(
            string_field(&self.state_path, FIELD_PRESENT),
            Ok(v) if v == "yes"
        )
    }
}

impl Default for ProcPowerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerSource for ProcPowerSource {
    fn charging_state(&self) -> ChargingState {
        if !self.present() {
            return ChargingState::NoBattery;
        }
        match string_field(&self.state_path, FIELD_STATE) {
            Ok(v) => match v.as_str() {
                "charging" => ChargingState::Charging,
                "charged" => ChargingState::Charged,
                "discharging" => ChargingState::Discharging,
                _ => ChargingState::Other,
            },
            Err(_) => ChargingState::Invalid,
        }
    }

    fn design_capacity_low(&self) -> Result<i64, ReadError> {
        integer_field(&self.info_path, FIELD_DESIGN_LOW)
    }

    fn remaining_capacity(&self) -> Result<i64, ReadError> {
        integer_field(&self.state_path, FIELD_REMAINING)
    }

    fn present_rate(&self) -> Result<i64, ReadError> {
        integer_field(&self.state_path, FIELD_PRESENT_RATE)
    }
}

fn string_field(path: &Path, field: &'static str) -> Result<String, ReadError> {
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        if name.trim() != field {
            continue;
        }
        return match rest.split_whitespace().next() {
            Some(tok) => Ok(tok.to_string()),
            None => Err(ReadError::Malformed {
                field,
                value: rest.trim().to_string(),
            }),
        };
    }
    Err(ReadError::MissingField(field))
}

fn integer_field(path: &Path, field: &'static str) -> Result<i64, ReadError> {
    let tok = string_field(path, field)?;
    tok.parse()
        .map_err(|_| ReadError::Malformed { field, value: tok })
}
