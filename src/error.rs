//! Error types for stepper-engine.
//!
//! Provides unified error handling across configuration, output pins, and the motion engine.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Output pin error
    Motor(MotorError),
    /// Motion engine error
    Motion(MotionError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Stepper name not found in configuration
    StepperNotFound(heapless::String<32>),
    /// Steps per revolution must be > 0
    InvalidStepsPerRevolution(u32),
    /// Angle per step must be > 0
    InvalidAnglePerStep(f32),
    /// Both or neither of `steps_per_revolution` and `angle_per_step` were given
    AmbiguousResolution,
    /// Step rate ceiling must be > 0
    InvalidMaxStepsPerSecond(u32),
    /// Initial speed must be > 0
    InvalidSpeed(u32),
    /// A pin identifier is empty or used twice
    InvalidPin(heapless::String<32>),
    /// A required builder field was not set
    MissingField(&'static str),
    /// The stepper is configured for another driver kind
    DriverMismatch {
        /// Driver kind the builder expects
        expected: &'static str,
    },
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Output pin errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorError {
    /// An optional pin needed by the operation was not configured
    PinNotConfigured {
        /// Device name
        device: heapless::String<32>,
        /// Which pin is missing
        pin: PinRole,
    },
    /// The digital output sink rejected a write
    WriteFailed {
        /// Pin identifier that failed
        pin: heapless::String<32>,
        /// Sink error, as reported by the sink
        detail: heapless::String<64>,
    },
    /// Motion requested while the driver outputs are disabled
    Disabled,
}

/// Role of an optional driver-board pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    /// Direction input
    Direction,
    /// Enable input (active low)
    Enable,
    /// Sleep input (active low)
    Sleep,
}

/// Motion engine errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Direction string is neither `forward` nor `backward`
    InvalidDirection(heapless::String<16>),
    /// Requested speed was out of range and has been clamped
    InvalidSpeed {
        /// Requested speed in RPM
        requested: u32,
        /// Speed actually applied
        applied: u32,
    },
    /// Move requested with a zero step count
    NoStepsToDo,
    /// A motion is in progress and the driver does not halt it automatically
    AlreadyRunning,
    /// Stop requested while no motion is in progress
    NotRunning,
    /// The worker observed a process interrupt
    Interrupted,
    /// The worker did not report its exit in time
    TimeoutWaitingForWorker,
    /// The process interrupt handler could not be installed
    InterruptHandler(heapless::String<64>),
}

impl Error {
    /// Whether this is a non-fatal validation error.
    ///
    /// Validation errors are reported but the operation still took effect
    /// (speed clamping) or changed nothing (bad direction string).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Motion(MotionError::InvalidSpeed { .. })
                | Error::Motion(MotionError::InvalidDirection(_))
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motor(e) => write!(f, "Motor error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::StepperNotFound(name) => write!(f, "Stepper '{}' not found", name),
            ConfigError::InvalidStepsPerRevolution(v) => {
                write!(f, "Invalid steps per revolution: {}. Must be > 0", v)
            }
            ConfigError::InvalidAnglePerStep(v) => {
                write!(f, "Invalid angle per step: {}. Must be > 0", v)
            }
            ConfigError::AmbiguousResolution => write!(
                f,
                "Exactly one of steps_per_revolution and angle_per_step must be set"
            ),
            ConfigError::InvalidMaxStepsPerSecond(v) => {
                write!(f, "Invalid max steps per second: {}. Must be > 0", v)
            }
            ConfigError::InvalidSpeed(v) => write!(f, "Invalid speed: {} rpm. Must be > 0", v),
            ConfigError::InvalidPin(pin) => write!(f, "Invalid or duplicate pin '{}'", pin),
            ConfigError::MissingField(field) => write!(f, "{} is required", field),
            ConfigError::DriverMismatch { expected } => {
                write!(f, "Stepper is not configured with a {} driver", expected)
            }
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MotorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorError::PinNotConfigured { device, pin } => {
                write!(f, "{}: {} pin is not set", device, pin)
            }
            MotorError::WriteFailed { pin, detail } => {
                write!(f, "write to pin '{}' failed: {}", pin, detail)
            }
            MotorError::Disabled => write!(f, "driver is disabled"),
        }
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinRole::Direction => write!(f, "direction"),
            PinRole::Enable => write!(f, "enable"),
            PinRole::Sleep => write!(f, "sleep"),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::InvalidDirection(dir) => write!(
                f,
                "Invalid direction '{}'. Value should be forward or backward",
                dir
            ),
            MotionError::InvalidSpeed { requested, applied } => write!(
                f,
                "Speed {} rpm out of range, using {} rpm",
                requested, applied
            ),
            MotionError::NoStepsToDo => write!(f, "no steps to do"),
            MotionError::AlreadyRunning => write!(f, "already running or moving"),
            MotionError::NotRunning => write!(f, "not running"),
            MotionError::Interrupted => write!(f, "motion interrupted"),
            MotionError::TimeoutWaitingForWorker => {
                write!(f, "timed out waiting for the motion worker to exit")
            }
            MotionError::InterruptHandler(msg) => {
                write!(f, "cannot install interrupt handler: {}", msg)
            }
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotorError> for Error {
    fn from(e: MotorError) -> Self {
        Error::Motor(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

/// Truncating conversion into a fixed-capacity string for error payloads.
pub(crate) fn short_string<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotorError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string_truncates() {
        let s: heapless::String<4> = short_string("forwards");
        assert_eq!(s.as_str(), "forw");
    }

    #[test]
    fn test_validation_kinds() {
        let speed = Error::Motion(MotionError::InvalidSpeed {
            requested: 0,
            applied: 1,
        });
        assert!(speed.is_validation());
        assert!(!Error::Motion(MotionError::NotRunning).is_validation());
    }

    #[test]
    fn test_pin_not_configured_message() {
        let err = Error::Motor(MotorError::PinNotConfigured {
            device: short_string("EasyDriver"),
            pin: PinRole::Direction,
        });
        assert_eq!(
            err.to_string(),
            "Motor error: EasyDriver: direction pin is not set"
        );
    }
}
