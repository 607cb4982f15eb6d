//! Stepper configuration from TOML.

use heapless::String;
use serde::Deserialize;

use crate::error::{ConfigError, Error, Result};
use crate::motion::timing::{self, DEFAULT_MAX_STEPS_PER_SECOND};
use crate::motion::StepperMode;

use super::units::{steps_per_revolution_from_angle, Degrees, Rpm};

/// Output stage of a stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverKind {
    /// Four coil outputs commutated through a phase table.
    Phase,
    /// STEP/DIR driver board.
    Pulse,
}

/// `[steppers.<name>.driver]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Which output stage the pins belong to.
    pub kind: DriverKind,

    /// Coil pins, `phase` only.
    #[serde(default)]
    pub pins: Option<[String<32>; 4]>,

    /// Phase table, `phase` only.
    #[serde(default)]
    pub mode: StepperMode,

    /// STEP pin, `pulse` only.
    #[serde(default)]
    pub step_pin: Option<String<32>>,

    /// DIR pin, `pulse` only.
    #[serde(default)]
    pub dir_pin: Option<String<32>>,

    /// EN pin (active low), `pulse` only.
    #[serde(default)]
    pub enable_pin: Option<String<32>>,

    /// SLEEP pin (active low), `pulse` only.
    #[serde(default)]
    pub sleep_pin: Option<String<32>>,
}

impl DriverConfig {
    /// All configured pin identifiers.
    pub fn pin_ids(&self) -> impl Iterator<Item = &str> {
        let phase = self.pins.iter().flat_map(|pins| pins.iter());
        let pulse = [
            &self.step_pin,
            &self.dir_pin,
            &self.enable_pin,
            &self.sleep_pin,
        ]
        .into_iter()
        .flatten();
        phase.chain(pulse).map(|p| p.as_str())
    }
}

/// Complete stepper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StepperConfig {
    /// Label used in log lines and error messages.
    #[serde(default)]
    pub name: Option<String<32>>,

    /// Output stage.
    pub driver: DriverConfig,

    /// Steps per revolution.
    #[serde(default)]
    pub steps_per_revolution: Option<u32>,

    /// Step angle, alternative to `steps_per_revolution`.
    #[serde(default)]
    pub angle_per_step: Option<Degrees>,

    /// Initial speed.
    #[serde(default)]
    pub speed_rpm: Option<Rpm>,

    /// Step rate ceiling used to derive the maximum speed.
    #[serde(default = "default_max_steps_per_second")]
    pub max_steps_per_second: u32,

    /// Force-stop a running motion when a new one is requested.
    #[serde(default)]
    pub halt_on_run_while_running: Option<bool>,

    /// Log failed steps and keep going instead of ending the motion.
    #[serde(default)]
    pub skip_step_errors: bool,
}

fn default_max_steps_per_second() -> u32 {
    DEFAULT_MAX_STEPS_PER_SECOND
}

/// Motor resolution from exactly one of a step count and a step angle.
pub(crate) fn resolve_steps_per_revolution(
    steps_per_revolution: Option<u32>,
    angle_per_step: Option<Degrees>,
) -> Result<u32> {
    match (steps_per_revolution, angle_per_step) {
        (Some(0), None) => Err(Error::Config(ConfigError::InvalidStepsPerRevolution(0))),
        (Some(steps), None) => Ok(steps),
        (None, Some(angle)) => steps_per_revolution_from_angle(angle)
            .ok_or(Error::Config(ConfigError::InvalidAnglePerStep(angle.0))),
        _ => Err(Error::Config(ConfigError::AmbiguousResolution)),
    }
}

impl StepperConfig {
    /// Resolution in steps per revolution.
    ///
    /// # Errors
    ///
    /// Fails unless exactly one of `steps_per_revolution` and
    /// `angle_per_step` is set to a positive value.
    pub fn resolved_steps_per_revolution(&self) -> Result<u32> {
        resolve_steps_per_revolution(self.steps_per_revolution, self.angle_per_step)
    }

    /// Maximum speed in RPM.
    pub fn max_rpm(&self) -> Result<u32> {
        let steps = self.resolved_steps_per_revolution()?;
        Ok(timing::max_rpm(steps, self.max_steps_per_second))
    }

    /// Whether a new motion force-stops the running one.
    ///
    /// Defaults to `true` for driver boards.
    pub fn halt_on_run_while_running(&self) -> bool {
        self.halt_on_run_while_running
            .unwrap_or(self.driver.kind == DriverKind::Pulse)
    }

    /// Name, or the default label for the driver kind.
    pub fn display_name(&self) -> &str {
        match (&self.name, self.driver.kind) {
            (Some(name), _) => name.as_str(),
            (None, DriverKind::Phase) => "Stepper",
            (None, DriverKind::Pulse) => "EasyDriver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(step_pin: &str) -> DriverConfig {
        DriverConfig {
            kind: DriverKind::Pulse,
            pins: None,
            mode: StepperMode::default(),
            step_pin: Some(String::try_from(step_pin).unwrap()),
            dir_pin: None,
            enable_pin: None,
            sleep_pin: None,
        }
    }

    fn config(steps: Option<u32>, angle: Option<f32>) -> StepperConfig {
        StepperConfig {
            name: None,
            driver: pulse("S"),
            steps_per_revolution: steps,
            angle_per_step: angle.map(Degrees),
            speed_rpm: None,
            max_steps_per_second: DEFAULT_MAX_STEPS_PER_SECOND,
            halt_on_run_while_running: None,
            skip_step_errors: false,
        }
    }

    #[test]
    fn test_resolution() {
        assert_eq!(config(Some(200), None).resolved_steps_per_revolution(), Ok(200));
        assert_eq!(config(None, Some(0.5)).resolved_steps_per_revolution(), Ok(720));
        assert_eq!(
            config(Some(200), Some(1.8)).resolved_steps_per_revolution(),
            Err(Error::Config(ConfigError::AmbiguousResolution))
        );
        assert_eq!(
            config(None, None).resolved_steps_per_revolution(),
            Err(Error::Config(ConfigError::AmbiguousResolution))
        );
        assert_eq!(
            config(None, Some(-1.0)).resolved_steps_per_revolution(),
            Err(Error::Config(ConfigError::InvalidAnglePerStep(-1.0)))
        );
    }

    #[test]
    fn test_defaults_follow_driver_kind() {
        let cfg = config(Some(200), None);
        assert!(cfg.halt_on_run_while_running());
        assert_eq!(cfg.display_name(), "EasyDriver");
        assert_eq!(cfg.max_rpm(), Ok(210));
    }
}
