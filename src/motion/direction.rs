//! Rotation direction.

use core::fmt;
use core::str::FromStr;

use embedded_hal::digital::PinState;

use crate::error::{short_string, Error, MotionError};

/// Direction of motor motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Forward (step count increases).
    #[default]
    Forward,
    /// Backward (step count decreases).
    Backward,
}

impl Direction {
    /// Get direction from signed step count.
    #[inline]
    pub fn from_steps(steps: i64) -> Self {
        if steps >= 0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    /// Level of a STEP/DIR board's DIR input for this direction.
    ///
    /// Low is forward, high is backward.
    #[inline]
    pub fn dir_level(self) -> PinState {
        match self {
            Direction::Forward => PinState::Low,
            Direction::Backward => PinState::High,
        }
    }

    /// Lower-case name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("forward") {
            Ok(Direction::Forward)
        } else if s.eq_ignore_ascii_case("backward") {
            Ok(Direction::Backward)
        } else {
            Err(Error::Motion(MotionError::InvalidDirection(short_string(s))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("forward".parse::<Direction>(), Ok(Direction::Forward));
        assert_eq!("Backward".parse::<Direction>(), Ok(Direction::Backward));
        assert_eq!("FORWARD".parse::<Direction>(), Ok(Direction::Forward));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "ccw".parse::<Direction>().unwrap_err();
        assert!(matches!(
            err,
            Error::Motion(MotionError::InvalidDirection(ref s)) if s.as_str() == "ccw"
        ));
    }

    #[test]
    fn test_sign_and_level() {
        assert_eq!(Direction::from_steps(-3), Direction::Backward);
        assert_eq!(Direction::from_steps(3).sign(), 1);
        assert_eq!(Direction::Forward.dir_level(), PinState::Low);
        assert_eq!(Direction::Backward.dir_level(), PinState::High);
    }
}
