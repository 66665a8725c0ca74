mod reader;

pub use reader::ProcPowerSource;

use thiserror::Error;

/// Classified power-source condition, one reading per poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    Charging,
    Charged,
    Discharging,
    /// Battery reported absent.
    NoBattery,
    /// State record missing or unreadable.
    Invalid,
    /// A state string outside the known vocabulary.
    Other,
}

/// Failure to extract a field from a power-source record.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("field `{0}` not found")]
    MissingField(&'static str),
    #[error("field `{field}` has malformed value `{value}`")]
    Malformed { field: &'static str, value: String },
}

/// Source of the classified charging state and the two capacity numbers
/// the low-battery test needs.
///
/// Reads are synchronous and cheap; the engine calls them at most once
/// per tick from its own task.
pub trait PowerSource: Send {
    /// Never fails: read problems map to `Invalid`, an absent battery
    /// to `NoBattery`, unrecognized vocabulary to `Other`.
    fn charging_state(&self) -> ChargingState;

    /// Design-low capacity threshold from the info record.
    fn design_capacity_low(&self) -> Result<i64, ReadError>;

    /// Remaining capacity from the state record.
    fn remaining_capacity(&self) -> Result<i64, ReadError>;

    /// Current discharge rate, when the state record exposes it. Only
    /// reported in logs; never part of the escalation policy.
    fn present_rate(&self) -> Result<i64, ReadError>;
}
