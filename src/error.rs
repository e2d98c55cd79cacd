//! Unified error types for the blood-pressure engine.
//!
//! A small set of `Copy` enums that every subsystem converts into, keeping
//! the session loop's error handling uniform.  Hardware errors never leave a
//! session as `Err`: the control loop folds them into an [`AbortReason`]
//! after venting the cuff.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible engine operation outside a running session funnels into
/// this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A GPIO or ADC operation failed.
    Hw(HwError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Calibration store refused the operation.
    Calibration(CalibrationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hw(e) => write!(f, "hardware: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// The ADC ready level was not observed within the read timeout.
    /// No clock pulses were issued.
    Timeout,
    /// A GPIO read or write returned an error.
    Gpio,
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "ADC ready timeout"),
            Self::Gpio => write!(f, "GPIO access failed"),
        }
    }
}

impl std::error::Error for HwError {}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Self::Hw(e)
    }
}

// ---------------------------------------------------------------------------
// Session abort reasons
// ---------------------------------------------------------------------------

/// Why a session ended without a valid measurement.
///
/// Hardware and timing reasons always end with the cuff vented (valve open,
/// pump off).  The two algorithmic reasons (`NoValidEnvelope`,
/// `InvalidPulsePressure`) end a session that completed safely but whose
/// trace could not be trusted; the caller may run a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    /// Cuff pressure reached the soft limit.
    Overpressure,
    /// Target pressure not reached within the inflate timeout.
    InflateTimeout,
    /// Cutoff pressure not reached within the deflate timeout.
    DeflateTimeout,
    /// Consecutive ADC timeouts exceeded the retry budget.
    SensorTimeout,
    /// Consecutive saturated ADC samples exceeded the retry budget.
    SensorSaturated,
    /// A pump or valve write failed.
    ActuatorFault,
    /// The external abort signal was raised.
    UserAbort,
    /// No usable oscillation envelope (flat trace, missing crossing).
    NoValidEnvelope,
    /// SYS − DIA fell outside the plausible range.
    InvalidPulsePressure,
}

impl AbortReason {
    /// True for reasons produced by the signal processor rather than by a
    /// hardware or timing fault.
    pub const fn is_algorithmic(self) -> bool {
        matches!(self, Self::NoValidEnvelope | Self::InvalidPulsePressure)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overpressure => write!(f, "overpressure"),
            Self::InflateTimeout => write!(f, "inflate timeout"),
            Self::DeflateTimeout => write!(f, "deflate timeout"),
            Self::SensorTimeout => write!(f, "sensor timeout"),
            Self::SensorSaturated => write!(f, "sensor saturated"),
            Self::ActuatorFault => write!(f, "actuator fault"),
            Self::UserAbort => write!(f, "user abort"),
            Self::NoValidEnvelope => write!(f, "no valid envelope"),
            Self::InvalidPulsePressure => write!(f, "invalid pulse pressure"),
        }
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults are accumulated in a bitfield by the safety supervisor.
/// Any set bit forces the session into `Aborted` with the hardware vented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Cuff pressure at or above the soft limit.
    Overpressure = 0b0000_0001,
    /// Too many consecutive ADC timeouts.
    SensorTimeout = 0b0000_0010,
    /// Too many consecutive saturated samples.
    SensorSaturated = 0b0000_0100,
    /// External stop request (user button, monitor).
    ExternalAbort = 0b0000_1000,
    /// A pump/valve GPIO write failed.
    ActuatorFault = 0b0001_0000,
}

impl SafetyFault {
    /// Faults in the order their abort reason takes precedence.
    pub const PRIORITY: [SafetyFault; 5] = [
        Self::Overpressure,
        Self::ActuatorFault,
        Self::SensorTimeout,
        Self::SensorSaturated,
        Self::ExternalAbort,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// The session abort reason reported for this fault.
    pub const fn abort_reason(self) -> AbortReason {
        match self {
            Self::Overpressure => AbortReason::Overpressure,
            Self::SensorTimeout => AbortReason::SensorTimeout,
            Self::SensorSaturated => AbortReason::SensorSaturated,
            Self::ExternalAbort => AbortReason::UserAbort,
            Self::ActuatorFault => AbortReason::ActuatorFault,
        }
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overpressure => write!(f, "overpressure"),
            Self::SensorTimeout => write!(f, "sensor timeout"),
            Self::SensorSaturated => write!(f, "sensor saturated"),
            Self::ExternalAbort => write!(f, "external abort"),
            Self::ActuatorFault => write!(f, "actuator fault"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    Io(String),
    /// The config text is not valid YAML/JSON for the schema.
    Parse(String),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Calibration store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A session holds the lease; calibration is read-only until it ends.
    SessionActive,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionActive => write!(f, "a measurement session is active"),
        }
    }
}

impl std::error::Error for CalibrationError {}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
