//! SparkFun EasyDriver and compatible STEP/DIR boards.
//!
//! The board steps on each rising STEP edge. DIR is low for forward and high
//! for backward. EN and SLEEP are active low.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use log::info;

use crate::config::units::Degrees;
use crate::error::{PinRole, Result};
use crate::output::DigitalWriter;

use super::builder::EasyDriverBuilder;
use super::emitter::Pulser;
use super::stepper::Stepper;

/// Stepper behind a STEP/DIR driver board.
pub type EasyDriver<W, D> = Stepper<Pulser<W, D>>;

impl<W, D> Stepper<Pulser<W, D>>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    /// Create a driver with default settings.
    ///
    /// Steps per revolution are `round(360 / angle_per_step)`; the speed
    /// starts at a quarter of the maximum.
    ///
    /// # Panics
    ///
    /// Panics if `angle_per_step` is not positive or a pin identifier is
    /// empty, longer than 32 bytes or repeated. Use
    /// [`builder`](Self::builder) to get an error instead.
    pub fn new(
        writer: Arc<W>,
        step_pin: &str,
        dir_pin: Option<&str>,
        enable_pin: Option<&str>,
        sleep_pin: Option<&str>,
        angle_per_step: impl Into<Degrees>,
        delay: D,
    ) -> Self {
        let mut builder = EasyDriverBuilder::new()
            .writer(writer)
            .delay(delay)
            .step_pin(step_pin)
            .angle_per_step(angle_per_step);
        if let Some(pin) = dir_pin {
            builder = builder.dir_pin(pin);
        }
        if let Some(pin) = enable_pin {
            builder = builder.enable_pin(pin);
        }
        if let Some(pin) = sleep_pin {
            builder = builder.sleep_pin(pin);
        }
        match builder.build() {
            Ok(driver) => driver,
            Err(e) => panic!("invalid EasyDriver: {}", e),
        }
    }

    /// Start building a driver.
    pub fn builder() -> EasyDriverBuilder<W, D> {
        EasyDriverBuilder::new()
    }

    /// Enable the board outputs (EN low).
    pub fn enable(&self) -> Result<()> {
        self.emitter.require(&self.shared, PinRole::Enable)?;
        self.emitter
            .write_optional(&self.shared, PinRole::Enable, PinState::Low)?;
        self.shared.lock().disabled = false;
        info!("{}: enabled", self.name());
        Ok(())
    }

    /// Stop any motion and disable the board outputs (EN high).
    ///
    /// Movement operations fail with `MotorError::Disabled` until
    /// [`enable`](Self::enable). A failed write is reported in preference
    /// to a failed stop.
    pub fn disable(&self) -> Result<()> {
        self.emitter.require(&self.shared, PinRole::Enable)?;
        self.stop_then("disable", || {
            self.emitter
                .write_optional(&self.shared, PinRole::Enable, PinState::High)?;
            self.shared.lock().disabled = true;
            info!("{}: disabled", self.name());
            Ok(())
        })
    }

    /// Stop any motion and put the board to sleep (SLEEP low).
    pub fn sleep(&self) -> Result<()> {
        self.emitter.require(&self.shared, PinRole::Sleep)?;
        self.stop_then("sleep", || {
            self.emitter
                .write_optional(&self.shared, PinRole::Sleep, PinState::Low)?;
            self.shared.lock().sleeping = true;
            info!("{}: sleeping", self.name());
            Ok(())
        })
    }

    /// Wake the board (SLEEP high) and wait 1 ms for its charge pump.
    pub fn wake(&self) -> Result<()> {
        self.emitter.require(&self.shared, PinRole::Sleep)?;
        self.emitter
            .write_optional(&self.shared, PinRole::Sleep, PinState::High)?;
        self.shared.lock().sleeping = false;
        self.emitter.delay().clone().delay_ms(1);
        info!("{}: awake", self.name());
        Ok(())
    }

    /// Whether the board outputs are enabled.
    pub fn is_enabled(&self) -> bool {
        !self.shared.lock().disabled
    }

    /// Whether the board is asleep.
    pub fn is_sleeping(&self) -> bool {
        self.shared.lock().sleeping
    }

    /// STEP pin.
    pub fn step_pin(&self) -> &str {
        self.emitter.step_pin()
    }

    /// DIR pin, if configured.
    pub fn dir_pin(&self) -> Option<&str> {
        self.emitter.dir_pin()
    }
}
