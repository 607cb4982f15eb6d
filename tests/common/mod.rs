//! Shared test support: a recording output sink and stepper constructors.

#![allow(dead_code)]

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use embedded_hal::digital::PinState;
use stepper_engine::{
    DigitalWriter, EasyDriver, Interrupt, StdDelay, StepperDriver, StepperMode,
};

/// One recorded write.
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub pin: String,
    pub level: PinState,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Faults {
    /// Writes with this index fail.
    fail_at: Option<usize>,
    /// Writes from this index on fail.
    fail_from: Option<usize>,
    /// Writes from this index on block until released.
    block_from: Option<usize>,
    released: bool,
}

/// Sink that records `(pin, level, time)` and injects faults on demand.
#[derive(Debug, Default)]
pub struct Recorder {
    writes: Mutex<Vec<Write>>,
    attempts: Mutex<usize>,
    faults: Mutex<Faults>,
    gate: Condvar,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the write with index `n` (0-based, counting attempts).
    pub fn fail_at(&self, n: usize) {
        self.faults.lock().unwrap().fail_at = Some(n);
    }

    /// Fail every write from index `n` on.
    pub fn fail_from(&self, n: usize) {
        self.faults.lock().unwrap().fail_from = Some(n);
    }

    /// Block every write from index `n` on until [`release`](Self::release).
    pub fn block_from(&self, n: usize) {
        self.faults.lock().unwrap().block_from = Some(n);
    }

    pub fn release(&self) {
        self.faults.lock().unwrap().released = true;
        self.gate.notify_all();
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// `(pin, level)` pairs, oldest first.
    pub fn log(&self) -> Vec<(String, PinState)> {
        self.writes()
            .into_iter()
            .map(|w| (w.pin, w.level))
            .collect()
    }

    /// Last level written to `pin`.
    pub fn last(&self, pin: &str) -> Option<PinState> {
        self.writes()
            .into_iter()
            .rev()
            .find(|w| w.pin == pin)
            .map(|w| w.level)
    }

    /// Wait until at least `n` writes were recorded.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.len() >= n
    }
}

impl DigitalWriter for Recorder {
    type Error = &'static str;

    fn digital_write(&self, pin: &str, level: PinState) -> Result<(), Self::Error> {
        let index = {
            let mut attempts = self.attempts.lock().unwrap();
            let index = *attempts;
            *attempts += 1;
            index
        };

        {
            let mut faults = self.faults.lock().unwrap();
            if faults.block_from.map_or(false, |n| index >= n) {
                while !faults.released {
                    faults = self.gate.wait(faults).unwrap();
                }
            }
            if faults.fail_at == Some(index) || faults.fail_from.map_or(false, |n| index >= n) {
                return Err("injected fault");
            }
        }

        self.writes.lock().unwrap().push(Write {
            pin: pin.to_string(),
            level,
            at: Instant::now(),
        });
        Ok(())
    }
}

pub const PINS: [&str; 4] = ["A", "B", "C", "D"];

/// Dual-phase 200 step/rev stepper on pins A..D, isolated from the global
/// interrupt.
pub fn stepper(recorder: &Arc<Recorder>, rpm: u32) -> StepperDriver<Recorder, StdDelay> {
    StepperDriver::builder()
        .writer(recorder.clone())
        .delay(StdDelay::new())
        .name("test")
        .pins(PINS)
        .mode(StepperMode::DualPhase)
        .steps_per_revolution(200)
        .max_steps_per_second(10_000)
        .speed_rpm(rpm)
        .interrupt(Interrupt::new())
        .build()
        .unwrap()
}

/// EasyDriver with STEP on "S" and the optional pins given.
pub fn easy_driver(
    recorder: &Arc<Recorder>,
    dir: Option<&str>,
    enable: Option<&str>,
    sleep: Option<&str>,
) -> EasyDriver<Recorder, StdDelay> {
    let mut builder = EasyDriver::builder()
        .writer(recorder.clone())
        .delay(StdDelay::new())
        .step_pin("S")
        .steps_per_revolution(200)
        .max_steps_per_second(10_000)
        .speed_rpm(300)
        .interrupt(Interrupt::new());
    if let Some(pin) = dir {
        builder = builder.dir_pin(pin);
    }
    if let Some(pin) = enable {
        builder = builder.enable_pin(pin);
    }
    if let Some(pin) = sleep {
        builder = builder.sleep_pin(pin);
    }
    builder.build().unwrap()
}
