//! Configuration validation.

use crate::error::{short_string, ConfigError, Error, Result};

use super::stepper::{DriverKind, StepperConfig};
use super::SystemConfig;

/// Validate a system configuration.
///
/// Checks, for every stepper:
/// - Exactly one of `steps_per_revolution` and `angle_per_step`, positive
/// - `max_steps_per_second` and `speed_rpm` are positive
/// - The pins required by the driver kind are present
/// - Pin identifiers are non-empty and distinct
pub fn validate_config(config: &SystemConfig) -> Result<()> {
    for (_, stepper) in config.steppers.iter() {
        validate_stepper(stepper)?;
    }
    Ok(())
}

/// Validate a single stepper configuration.
pub fn validate_stepper(config: &StepperConfig) -> Result<()> {
    config.resolved_steps_per_revolution()?;

    if config.max_steps_per_second == 0 {
        return Err(Error::Config(ConfigError::InvalidMaxStepsPerSecond(0)));
    }

    if let Some(speed) = config.speed_rpm {
        if speed.0 == 0 {
            return Err(Error::Config(ConfigError::InvalidSpeed(0)));
        }
    }

    let driver = &config.driver;
    match driver.kind {
        DriverKind::Phase if driver.pins.is_none() => {
            return Err(Error::Config(ConfigError::MissingField("driver.pins")));
        }
        DriverKind::Pulse if driver.step_pin.is_none() => {
            return Err(Error::Config(ConfigError::MissingField("driver.step_pin")));
        }
        _ => {}
    }

    validate_pins(driver.pin_ids())
}

/// Pin identifiers must be non-empty and distinct.
pub(crate) fn validate_pins<'a>(pins: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen: heapless::Vec<&str, 8> = heapless::Vec::new();
    for pin in pins {
        if pin.is_empty() || seen.contains(&pin) {
            return Err(Error::Config(ConfigError::InvalidPin(short_string(pin))));
        }
        // at most eight pins per driver
        let _ = seen.push(pin);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::units::Rpm;
    use crate::config::DriverConfig;
    use crate::motion::StepperMode;

    fn phase(pins: [&str; 4]) -> StepperConfig {
        StepperConfig {
            name: None,
            driver: DriverConfig {
                kind: DriverKind::Phase,
                pins: Some(pins.map(|p| heapless::String::try_from(p).unwrap())),
                mode: StepperMode::HalfStep,
                step_pin: None,
                dir_pin: None,
                enable_pin: None,
                sleep_pin: None,
            },
            steps_per_revolution: Some(200),
            angle_per_step: None,
            speed_rpm: None,
            max_steps_per_second: 700,
            halt_on_run_while_running: None,
            skip_step_errors: false,
        }
    }

    #[test]
    fn test_valid_phase_stepper() {
        assert!(validate_stepper(&phase(["A", "B", "C", "D"])).is_ok());
    }

    #[test]
    fn test_duplicate_pin() {
        let result = validate_stepper(&phase(["A", "B", "A", "D"]));
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidPin(ref pin))) if pin.as_str() == "A"
        ));
    }

    #[test]
    fn test_empty_pin() {
        assert!(matches!(
            validate_stepper(&phase(["A", "", "C", "D"])),
            Err(Error::Config(ConfigError::InvalidPin(_)))
        ));
    }

    #[test]
    fn test_zero_speed_and_rate() {
        let mut config = phase(["A", "B", "C", "D"]);
        config.speed_rpm = Some(Rpm(0));
        assert_eq!(
            validate_stepper(&config),
            Err(Error::Config(ConfigError::InvalidSpeed(0)))
        );

        let mut config = phase(["A", "B", "C", "D"]);
        config.max_steps_per_second = 0;
        assert_eq!(
            validate_stepper(&config),
            Err(Error::Config(ConfigError::InvalidMaxStepsPerSecond(0)))
        );
    }

    #[test]
    fn test_missing_driver_pins() {
        let mut config = phase(["A", "B", "C", "D"]);
        config.driver.pins = None;
        assert_eq!(
            validate_stepper(&config),
            Err(Error::Config(ConfigError::MissingField("driver.pins")))
        );

        config.driver.kind = DriverKind::Pulse;
        assert_eq!(
            validate_stepper(&config),
            Err(Error::Config(ConfigError::MissingField("driver.step_pin")))
        );
    }
}
