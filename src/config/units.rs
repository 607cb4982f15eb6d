//! Unit types for physical quantities.
//!
//! Provides type-safe representations of angles, rotational speed,
//! and motor steps to prevent unit confusion at compile time.

use libm::roundf;
use serde::Deserialize;

/// Angular position or distance in degrees.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[serde(transparent)]
pub struct Degrees(pub f32);

impl Degrees {
    /// Create a new Degrees value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for Degrees {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

impl From<i32> for Degrees {
    fn from(value: i32) -> Self {
        Self(value as f32)
    }
}

/// Rotational speed in revolutions per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(transparent)]
pub struct Rpm(pub u32);

impl Rpm {
    /// Create a new Rpm value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Rpm {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Signed step count.
///
/// Uses i64 for unlimited range in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Steps(pub i64);

impl Steps {
    /// Create a new Steps value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Nearest whole step count for an angle, given the motor resolution.
    #[inline]
    pub fn from_degrees(degrees: Degrees, steps_per_revolution: u32) -> Self {
        Self(roundf(degrees.0 * steps_per_revolution as f32 / 360.0) as i64)
    }

    /// Convert back to degrees.
    #[inline]
    pub fn to_degrees(self, steps_per_revolution: u32) -> Degrees {
        Degrees(self.0 as f32 * 360.0 / steps_per_revolution as f32)
    }
}

/// Steps per revolution for a motor specified by its step angle.
///
/// Returns `None` for non-positive or non-finite angles.
pub fn steps_per_revolution_from_angle(angle_per_step: Degrees) -> Option<u32> {
    if !angle_per_step.0.is_finite() || angle_per_step.0 <= 0.0 {
        return None;
    }
    let steps = roundf(360.0 / angle_per_step.0);
    if steps < 1.0 {
        None
    } else {
        Some(steps as u32)
    }
}
