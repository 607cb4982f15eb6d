//! Four-wire stepper driven through its coil outputs.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::info;

use crate::error::Result;
use crate::motion::{PhaseTable, StepperMode};
use crate::output::DigitalWriter;

use super::builder::StepperDriverBuilder;
use super::emitter::Commutator;
use super::stepper::Stepper;

/// Stepper commutated through four phase outputs.
pub type StepperDriver<W, D> = Stepper<Commutator<W, D>>;

impl<W, D> Stepper<Commutator<W, D>>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    /// Create a stepper with default settings.
    ///
    /// `pins` are listed in phase table bit order. The speed starts at the
    /// maximum for a 700 steps/s ceiling.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_revolution` is 0 or a pin identifier is empty,
    /// longer than 32 bytes or repeated. Use [`builder`](Self::builder) to
    /// get an error instead.
    pub fn new(
        writer: Arc<W>,
        pins: [&str; 4],
        mode: StepperMode,
        steps_per_revolution: u32,
        delay: D,
    ) -> Self {
        let built = StepperDriverBuilder::new()
            .writer(writer)
            .delay(delay)
            .pins(pins)
            .mode(mode)
            .steps_per_revolution(steps_per_revolution)
            .build();
        match built {
            Ok(stepper) => stepper,
            Err(e) => panic!("invalid stepper: {}", e),
        }
    }

    /// Start building a stepper.
    pub fn builder() -> StepperDriverBuilder<W, D> {
        StepperDriverBuilder::new()
    }

    /// Coil pins, in phase table bit order.
    pub fn pins(&self) -> [&str; 4] {
        let pins = self.emitter.pins();
        [
            pins[0].as_str(),
            pins[1].as_str(),
            pins[2].as_str(),
            pins[3].as_str(),
        ]
    }

    /// Stop any motion and release the coils (all pins low).
    ///
    /// The position is kept; the next step energizes the coils again. A
    /// failed write is reported in preference to a failed stop.
    pub fn sleep(&self) -> Result<()> {
        self.stop_then("sleep", || {
            self.emitter.release()?;
            info!("{}: coils released", self.name());
            Ok(())
        })
    }

    /// Phase table in use.
    pub fn phase_table(&self) -> PhaseTable {
        self.emitter.table()
    }
}
