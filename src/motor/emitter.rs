//! Step emitters: how one step reaches the outputs.
//!
//! [`Commutator`] drives the four coil outputs of a bare stepper from a
//! [`PhaseTable`]. [`Pulser`] drives the STEP input of an external driver
//! board such as the SparkFun EasyDriver.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use heapless::String;

use crate::error::{Error, MotorError, PinRole, Result};
use crate::motion::{Direction, PhaseTable};
use crate::output::{write_pin, DigitalWriter};

use super::state::Shared;

/// Produces single steps for the motion engine.
///
/// Sealed: implemented by [`Commutator`] and [`Pulser`] only.
pub trait StepEmitter: private::Sealed + Clone + Send + 'static {
    /// Emit one step in the current direction and wait out the step period.
    ///
    /// A failed write leaves the step counter unchanged.
    fn emit(&mut self, shared: &Shared) -> Result<()>;

    /// Change the direction of subsequent steps.
    fn apply_direction(&self, shared: &Shared, direction: Direction) -> Result<()>;

    /// Set the direction for a counted move.
    fn arm_direction(&self, shared: &Shared, direction: Direction) -> Result<()> {
        self.apply_direction(shared, direction)
    }
}

mod private {
    pub trait Sealed {}
    impl<W, D> Sealed for super::Commutator<W, D> {}
    impl<W, D> Sealed for super::Pulser<W, D> {}
}

fn sleep_us<D: DelayNs>(delay: &mut D, us: u64) {
    delay.delay_us(u32::try_from(us).unwrap_or(u32::MAX));
}

/// Four-phase commutation through a phase table.
pub struct Commutator<W, D> {
    writer: Arc<W>,
    pins: [String<32>; 4],
    table: PhaseTable,
    delay: D,
}

impl<W, D> Commutator<W, D> {
    pub(crate) fn new(writer: Arc<W>, pins: [String<32>; 4], table: PhaseTable, delay: D) -> Self {
        Self {
            writer,
            pins,
            table,
            delay,
        }
    }

    /// Coil pins, in phase table bit order.
    pub fn pins(&self) -> &[String<32>; 4] {
        &self.pins
    }

    /// Phase table in use.
    pub fn table(&self) -> PhaseTable {
        self.table
    }
}

impl<W, D> Commutator<W, D>
where
    W: DigitalWriter,
{
    /// Drive every coil pin low, in `pins[0..3]` order.
    pub(crate) fn release(&self) -> Result<()> {
        for pin in self.pins.iter() {
            write_pin(&*self.writer, pin, PinState::Low)?;
        }
        Ok(())
    }
}

impl<W, D: Clone> Clone for Commutator<W, D> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            pins: self.pins.clone(),
            table: self.table,
            delay: self.delay.clone(),
        }
    }
}

impl<W, D> StepEmitter for Commutator<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    fn emit(&mut self, shared: &Shared) -> Result<()> {
        {
            let mut state = shared.lock();
            let previous = state.step_num;
            let steps_per_revolution = i64::from(shared.steps_per_revolution());

            let mut next = previous + state.direction.sign();
            if next >= steps_per_revolution {
                next = 0;
            } else if next < 0 {
                next = steps_per_revolution - 1;
            }
            state.step_num = next;

            // next is within [0, steps_per_revolution)
            let levels = self.table.levels(next as usize);
            for (pin, level) in self.pins.iter().zip(levels) {
                if let Err(e) = write_pin(&*self.writer, pin, level) {
                    state.step_num = previous;
                    return Err(e);
                }
            }
        }

        // Outside the lock so direction and speed changes are not held up.
        sleep_us(&mut self.delay, shared.delay_per_step_us());
        Ok(())
    }

    fn apply_direction(&self, shared: &Shared, direction: Direction) -> Result<()> {
        shared.lock().direction = direction;
        Ok(())
    }
}

/// STEP pulse generation for an external driver board.
///
/// DIR, EN (active low) and SLEEP (active low) are optional.
pub struct Pulser<W, D> {
    writer: Arc<W>,
    step_pin: String<32>,
    dir_pin: Option<String<32>>,
    enable_pin: Option<String<32>>,
    sleep_pin: Option<String<32>>,
    delay: D,
}

impl<W, D> Pulser<W, D> {
    pub(crate) fn new(
        writer: Arc<W>,
        step_pin: String<32>,
        dir_pin: Option<String<32>>,
        enable_pin: Option<String<32>>,
        sleep_pin: Option<String<32>>,
        delay: D,
    ) -> Self {
        Self {
            writer,
            step_pin,
            dir_pin,
            enable_pin,
            sleep_pin,
            delay,
        }
    }

    /// STEP pin.
    pub fn step_pin(&self) -> &str {
        self.step_pin.as_str()
    }

    /// DIR pin, if configured.
    pub fn dir_pin(&self) -> Option<&str> {
        self.dir_pin.as_deref()
    }

    /// EN pin, if configured.
    pub fn enable_pin(&self) -> Option<&str> {
        self.enable_pin.as_deref()
    }

    /// SLEEP pin, if configured.
    pub fn sleep_pin(&self) -> Option<&str> {
        self.sleep_pin.as_deref()
    }

    pub(crate) fn delay(&self) -> &D {
        &self.delay
    }
}

impl<W, D> Pulser<W, D>
where
    W: DigitalWriter,
{
    /// Write `level` to an optional pin, failing when it is not configured.
    pub(crate) fn write_optional(
        &self,
        shared: &Shared,
        role: PinRole,
        level: PinState,
    ) -> Result<()> {
        let pin = match role {
            PinRole::Direction => self.dir_pin.as_ref(),
            PinRole::Enable => self.enable_pin.as_ref(),
            PinRole::Sleep => self.sleep_pin.as_ref(),
        };
        let pin = pin.ok_or_else(|| not_configured(shared, role))?;
        write_pin(&*self.writer, pin, level)
    }

    /// Fail early when an optional pin is missing.
    pub(crate) fn require(&self, shared: &Shared, role: PinRole) -> Result<()> {
        let configured = match role {
            PinRole::Direction => self.dir_pin.is_some(),
            PinRole::Enable => self.enable_pin.is_some(),
            PinRole::Sleep => self.sleep_pin.is_some(),
        };
        if configured {
            Ok(())
        } else {
            Err(not_configured(shared, role))
        }
    }
}

fn not_configured(shared: &Shared, role: PinRole) -> Error {
    Error::Motor(MotorError::PinNotConfigured {
        device: crate::error::short_string(shared.name()),
        pin: role,
    })
}

impl<W, D: Clone> Clone for Pulser<W, D> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            step_pin: self.step_pin.clone(),
            dir_pin: self.dir_pin.clone(),
            enable_pin: self.enable_pin.clone(),
            sleep_pin: self.sleep_pin.clone(),
            delay: self.delay.clone(),
        }
    }
}

impl<W, D> StepEmitter for Pulser<W, D>
where
    W: DigitalWriter + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    fn emit(&mut self, shared: &Shared) -> Result<()> {
        let mut state = shared.lock();

        write_pin(&*self.writer, &self.step_pin, PinState::Low)?;
        sleep_us(&mut self.delay, shared.delay_per_step_us());
        // rising edge commits the step on the board
        write_pin(&*self.writer, &self.step_pin, PinState::High)?;

        state.step_num += state.direction.sign();
        Ok(())
    }

    fn apply_direction(&self, shared: &Shared, direction: Direction) -> Result<()> {
        self.write_optional(shared, PinRole::Direction, direction.dir_level())?;
        shared.lock().direction = direction;
        Ok(())
    }

    fn arm_direction(&self, shared: &Shared, direction: Direction) -> Result<()> {
        // Without a DIR pin the board always steps forward.
        if self.dir_pin.is_none()
            && direction == Direction::Forward
            && shared.lock().direction == Direction::Forward
        {
            return Ok(());
        }
        self.apply_direction(shared, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        writes: Mutex<std::vec::Vec<(std::string::String, PinState)>>,
        fail_on: Option<usize>,
    }

    impl DigitalWriter for Log {
        type Error = &'static str;

        fn digital_write(&self, pin: &str, level: PinState) -> core::result::Result<(), Self::Error> {
            let mut writes = self.writes.lock().unwrap();
            if self.fail_on == Some(writes.len()) {
                return Err("write error");
            }
            writes.push((pin.into(), level));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn shared(steps_per_revolution: u32) -> Shared {
        Shared::new(String::try_from("test").unwrap(), steps_per_revolution, 210, 60)
    }

    fn pins() -> [String<32>; 4] {
        ["A", "B", "C", "D"].map(|p| String::try_from(p).unwrap())
    }

    #[test]
    fn test_commutator_backward_wraps_to_last_step() {
        let writer = Arc::new(Log::default());
        let mut emitter = Commutator::new(writer.clone(), pins(), PhaseTable::DUAL_PHASE, NoDelay);
        let shared = shared(200);

        emitter.apply_direction(&shared, Direction::Backward).unwrap();
        emitter.emit(&shared).unwrap();

        assert_eq!(shared.snapshot().step_num, 199);
        // row 199 % 4 == 3 -> 0011
        let levels: std::vec::Vec<_> = writer.writes.lock().unwrap().iter().map(|w| w.1).collect();
        assert_eq!(
            levels,
            [PinState::Low, PinState::Low, PinState::High, PinState::High]
        );
    }

    #[test]
    fn test_commutator_write_error_restores_step() {
        let writer = Arc::new(Log {
            fail_on: Some(2),
            ..Log::default()
        });
        let mut emitter = Commutator::new(writer.clone(), pins(), PhaseTable::SINGLE_PHASE, NoDelay);
        let shared = shared(200);

        let err = emitter.emit(&shared).unwrap_err();
        assert!(matches!(
            err,
            Error::Motor(MotorError::WriteFailed { ref pin, .. }) if pin.as_str() == "C"
        ));
        assert_eq!(shared.snapshot().step_num, 0);
        assert_eq!(writer.writes.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_pulser_counts_unbounded() {
        let writer = Arc::new(Log::default());
        let mut emitter = Pulser::new(
            writer.clone(),
            String::try_from("S").unwrap(),
            Some(String::try_from("D").unwrap()),
            None,
            None,
            NoDelay,
        );
        let shared = shared(4);

        emitter.apply_direction(&shared, Direction::Backward).unwrap();
        for _ in 0..6 {
            emitter.emit(&shared).unwrap();
        }
        assert_eq!(shared.snapshot().step_num, -6);
        assert_eq!(writer.writes.lock().unwrap()[0], ("D".into(), PinState::High));
        assert_eq!(writer.writes.lock().unwrap().len(), 13);
    }

    #[test]
    fn test_pulser_without_dir_pin() {
        let writer = Arc::new(Log::default());
        let emitter = Pulser::new(
            writer.clone(),
            String::try_from("S").unwrap(),
            None,
            None,
            None,
            NoDelay,
        );
        let shared = shared(200);

        assert!(emitter.arm_direction(&shared, Direction::Forward).is_ok());
        assert!(matches!(
            emitter.arm_direction(&shared, Direction::Backward),
            Err(Error::Motor(MotorError::PinNotConfigured {
                pin: PinRole::Direction,
                ..
            }))
        ));
        assert!(writer.writes.lock().unwrap().is_empty());
    }
}
