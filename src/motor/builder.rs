//! Builders for [`StepperDriver`] and [`EasyDriver`].

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::config::stepper::resolve_steps_per_revolution;
use crate::config::units::Degrees;
use crate::config::validation::{validate_pins, validate_stepper};
use crate::config::{DriverKind, StepperConfig, SystemConfig};
use crate::error::{short_string, ConfigError, Error, Result};
use crate::motion::timing::{self, DEFAULT_MAX_STEPS_PER_SECOND};
use crate::motion::StepperMode;
use crate::output::DigitalWriter;

use super::emitter::{Commutator, Pulser};
use super::interrupt::Interrupt;
use super::state::Shared;
use super::stepper::{MotionOptions, Stepper};
use super::{EasyDriver, StepperDriver};

/// Settings common to both variants.
struct Common<W, D> {
    writer: Option<Arc<W>>,
    delay: Option<D>,
    name: Option<String<32>>,
    speed_rpm: Option<u32>,
    max_steps_per_second: u32,
    halt_on_run_while_running: Option<bool>,
    skip_step_errors: bool,
    interrupt: Option<Interrupt>,
    // first invalid pin id passed to a setter
    invalid_pin: Option<String<32>>,
}

impl<W, D> Common<W, D> {
    fn new() -> Self {
        Self {
            writer: None,
            delay: None,
            name: None,
            speed_rpm: None,
            max_steps_per_second: DEFAULT_MAX_STEPS_PER_SECOND,
            halt_on_run_while_running: None,
            skip_step_errors: false,
            interrupt: None,
            invalid_pin: None,
        }
    }

    fn pin(&mut self, id: &str) -> String<32> {
        match String::try_from(id) {
            Ok(pin) => pin,
            Err(()) => {
                self.invalid_pin.get_or_insert_with(|| short_string(id));
                String::new()
            }
        }
    }

    fn apply_config(&mut self, config: &StepperConfig) {
        self.name = Some(short_string(config.display_name()));
        self.speed_rpm = config.speed_rpm.map(|s| s.value());
        self.max_steps_per_second = config.max_steps_per_second;
        self.halt_on_run_while_running = Some(config.halt_on_run_while_running());
        self.skip_step_errors = config.skip_step_errors;
    }

    /// Check the settings and produce the shared state.
    fn finish(
        &mut self,
        default_name: &str,
        steps_per_revolution: u32,
        default_speed: fn(u32) -> u32,
        default_halt: bool,
    ) -> Result<(Arc<W>, D, Shared, MotionOptions, Interrupt)> {
        if let Some(pin) = self.invalid_pin.take() {
            return Err(Error::Config(ConfigError::InvalidPin(pin)));
        }
        let writer = self
            .writer
            .take()
            .ok_or(Error::Config(ConfigError::MissingField("writer")))?;
        let delay = self
            .delay
            .take()
            .ok_or(Error::Config(ConfigError::MissingField("delay")))?;
        if self.max_steps_per_second == 0 {
            return Err(Error::Config(ConfigError::InvalidMaxStepsPerSecond(0)));
        }
        if self.speed_rpm == Some(0) {
            return Err(Error::Config(ConfigError::InvalidSpeed(0)));
        }

        let max_rpm = timing::max_rpm(steps_per_revolution, self.max_steps_per_second);
        let speed = self.speed_rpm.unwrap_or_else(|| default_speed(max_rpm));
        let name = self
            .name
            .take()
            .unwrap_or_else(|| short_string(default_name));

        let options = MotionOptions {
            halt_on_run_while_running: self.halt_on_run_while_running.unwrap_or(default_halt),
            skip_step_errors: self.skip_step_errors,
        };
        let interrupt = self.interrupt.take().unwrap_or_else(Interrupt::global);

        Ok((
            writer,
            delay,
            Shared::new(name, steps_per_revolution, max_rpm, speed),
            options,
            interrupt,
        ))
    }
}

fn find<'a>(config: &'a SystemConfig, name: &str) -> Result<&'a StepperConfig> {
    config
        .stepper(name)
        .ok_or_else(|| Error::Config(ConfigError::StepperNotFound(short_string(name))))
}

macro_rules! common_setters {
    () => {
        /// Set the digital output sink.
        pub fn writer(mut self, writer: Arc<W>) -> Self {
            self.common.writer = Some(writer);
            self
        }

        /// Set the delay provider.
        pub fn delay(mut self, delay: D) -> Self {
            self.common.delay = Some(delay);
            self
        }

        /// Set the device name used in logs and errors.
        pub fn name(mut self, name: &str) -> Self {
            self.common.name = Some(short_string(name));
            self
        }

        /// Set the initial speed in RPM.
        pub fn speed_rpm(mut self, rpm: u32) -> Self {
            self.common.speed_rpm = Some(rpm);
            self
        }

        /// Set the step rate ceiling used to derive the maximum speed.
        pub fn max_steps_per_second(mut self, steps: u32) -> Self {
            self.common.max_steps_per_second = steps;
            self
        }

        /// Force-stop a running motion when a new one is requested.
        pub fn halt_on_run_while_running(mut self, halt: bool) -> Self {
            self.common.halt_on_run_while_running = Some(halt);
            self
        }

        /// Log failed steps and keep going instead of ending the motion.
        pub fn skip_step_errors(mut self, skip: bool) -> Self {
            self.common.skip_step_errors = skip;
            self
        }

        /// Listen to `interrupt` instead of [`Interrupt::global`].
        pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
            self.common.interrupt = Some(interrupt);
            self
        }
    };
}

/// Builder for [`StepperDriver`].
///
/// # Example
///
/// ```rust,ignore
/// let stepper = StepperDriver::builder()
///     .writer(bank)
///     .delay(StdDelay::new())
///     .pins(["A", "B", "C", "D"])
///     .steps_per_revolution(200)
///     .build()?;
/// ```
pub struct StepperDriverBuilder<W, D> {
    common: Common<W, D>,
    pins: Option<[String<32>; 4]>,
    mode: StepperMode,
    steps_per_revolution: Option<u32>,
}

impl<W, D> Default for StepperDriverBuilder<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, D> StepperDriverBuilder<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            common: Common::new(),
            pins: None,
            mode: StepperMode::default(),
            steps_per_revolution: None,
        }
    }

    common_setters!();

    /// Set the coil pins, in phase table bit order.
    pub fn pins(mut self, pins: [&str; 4]) -> Self {
        let common = &mut self.common;
        self.pins = Some(pins.map(|p| common.pin(p)));
        self
    }

    /// Set the stepping mode.
    pub fn mode(mut self, mode: StepperMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set steps per revolution.
    pub fn steps_per_revolution(mut self, steps: u32) -> Self {
        self.steps_per_revolution = Some(steps);
        self
    }

    /// Configure from a StepperConfig.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or not a `phase` driver.
    pub fn from_stepper_config(mut self, config: &StepperConfig) -> Result<Self> {
        validate_stepper(config)?;
        if config.driver.kind != DriverKind::Phase {
            return Err(Error::Config(ConfigError::DriverMismatch { expected: "phase" }));
        }
        self.common.apply_config(config);
        self.pins = config.driver.pins.clone();
        self.mode = config.driver.mode;
        self.steps_per_revolution = Some(config.resolved_steps_per_revolution()?);
        Ok(self)
    }

    /// Configure from SystemConfig by stepper name.
    pub fn from_config(self, config: &SystemConfig, name: &str) -> Result<Self> {
        self.from_stepper_config(find(config, name)?)
    }

    /// Build the StepperDriver.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(mut self) -> Result<StepperDriver<W, D>> {
        let pins = self
            .pins
            .take()
            .ok_or(Error::Config(ConfigError::MissingField("pins")))?;
        let steps_per_revolution = self
            .steps_per_revolution
            .ok_or(Error::Config(ConfigError::MissingField("steps_per_revolution")))?;
        if steps_per_revolution == 0 {
            return Err(Error::Config(ConfigError::InvalidStepsPerRevolution(0)));
        }

        let (writer, delay, shared, options, interrupt) =
            self.common
                .finish("Stepper", steps_per_revolution, |max| max, false)?;
        validate_pins(pins.iter().map(|p| p.as_str()))?;

        let emitter = Commutator::new(writer, pins, self.mode.table(), delay);
        Ok(Stepper::from_parts(shared, emitter, options, interrupt))
    }
}

/// Builder for [`EasyDriver`].
///
/// # Example
///
/// ```rust,ignore
/// let driver = EasyDriver::builder()
///     .writer(bank)
///     .delay(StdDelay::new())
///     .step_pin("STEP")
///     .dir_pin("DIR")
///     .angle_per_step(1.8_f32)
///     .build()?;
/// ```
pub struct EasyDriverBuilder<W, D> {
    common: Common<W, D>,
    step_pin: Option<String<32>>,
    dir_pin: Option<String<32>>,
    enable_pin: Option<String<32>>,
    sleep_pin: Option<String<32>>,
    steps_per_revolution: Option<u32>,
    angle_per_step: Option<Degrees>,
}

impl<W, D> Default for EasyDriverBuilder<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, D> EasyDriverBuilder<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            common: Common::new(),
            step_pin: None,
            dir_pin: None,
            enable_pin: None,
            sleep_pin: None,
            steps_per_revolution: None,
            angle_per_step: None,
        }
    }

    common_setters!();

    /// Set the STEP pin.
    pub fn step_pin(mut self, pin: &str) -> Self {
        self.step_pin = Some(self.common.pin(pin));
        self
    }

    /// Set the DIR pin.
    pub fn dir_pin(mut self, pin: &str) -> Self {
        self.dir_pin = Some(self.common.pin(pin));
        self
    }

    /// Set the EN pin (active low).
    pub fn enable_pin(mut self, pin: &str) -> Self {
        self.enable_pin = Some(self.common.pin(pin));
        self
    }

    /// Set the SLEEP pin (active low).
    pub fn sleep_pin(mut self, pin: &str) -> Self {
        self.sleep_pin = Some(self.common.pin(pin));
        self
    }

    /// Set steps per revolution.
    pub fn steps_per_revolution(mut self, steps: u32) -> Self {
        self.steps_per_revolution = Some(steps);
        self
    }

    /// Set the step angle; steps per revolution become `round(360 / angle)`.
    pub fn angle_per_step(mut self, angle: impl Into<Degrees>) -> Self {
        self.angle_per_step = Some(angle.into());
        self
    }

    /// Configure from a StepperConfig.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or not a `pulse` driver.
    pub fn from_stepper_config(mut self, config: &StepperConfig) -> Result<Self> {
        validate_stepper(config)?;
        if config.driver.kind != DriverKind::Pulse {
            return Err(Error::Config(ConfigError::DriverMismatch { expected: "pulse" }));
        }
        self.common.apply_config(config);
        self.step_pin = config.driver.step_pin.clone();
        self.dir_pin = config.driver.dir_pin.clone();
        self.enable_pin = config.driver.enable_pin.clone();
        self.sleep_pin = config.driver.sleep_pin.clone();
        self.steps_per_revolution = config.steps_per_revolution;
        self.angle_per_step = config.angle_per_step;
        Ok(self)
    }

    /// Configure from SystemConfig by stepper name.
    pub fn from_config(self, config: &SystemConfig, name: &str) -> Result<Self> {
        self.from_stepper_config(find(config, name)?)
    }

    /// Build the EasyDriver.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(mut self) -> Result<EasyDriver<W, D>> {
        let step_pin = self
            .step_pin
            .take()
            .ok_or(Error::Config(ConfigError::MissingField("step_pin")))?;
        let steps_per_revolution =
            resolve_steps_per_revolution(self.steps_per_revolution, self.angle_per_step)?;

        let (writer, delay, shared, options, interrupt) = self.common.finish(
            "EasyDriver",
            steps_per_revolution,
            |max| (max / 4).max(1),
            true,
        )?;
        let pins = [&Some(step_pin.clone()), &self.dir_pin, &self.enable_pin, &self.sleep_pin];
        validate_pins(pins.into_iter().flatten().map(|p| p.as_str()))?;

        let emitter = Pulser::new(
            writer,
            step_pin,
            self.dir_pin,
            self.enable_pin,
            self.sleep_pin,
            delay,
        );
        Ok(Stepper::from_parts(shared, emitter, options, interrupt))
    }
}
