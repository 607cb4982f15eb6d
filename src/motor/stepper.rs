//! The motion engine shared by both stepper variants.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::config::units::{Degrees, Steps};
use crate::error::{Error, MotionError, MotorError, Result};
use crate::motion::Direction;

use super::emitter::StepEmitter;
use super::interrupt::Interrupt;
use super::state::{MotionState, Shared};
use super::worker::{Motion, Observer, Worker};

type StartHook = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Behaviour switches fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MotionOptions {
    pub halt_on_run_while_running: bool,
    pub skip_step_errors: bool,
}

/// A stepper motor driven by a background worker thread.
///
/// All operations take `&self`; share the stepper between threads with an
/// `Arc`. At most one motion runs at a time. Lifecycle operations (`move_*`,
/// `run`, `stop`, `halt`, `step`) are serialized; `set_direction`,
/// `set_speed` and the getters may be called at any time, including while a
/// motion runs.
///
/// Use the [`StepperDriver`](super::StepperDriver) and
/// [`EasyDriver`](super::EasyDriver) aliases.
pub struct Stepper<E> {
    pub(crate) shared: Arc<Shared>,
    pub(crate) emitter: E,
    worker: Mutex<Option<Worker>>,
    options: MotionOptions,
    interrupt: Interrupt,
    observer: Mutex<Option<Observer>>,
    start_hook: Mutex<Option<StartHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: StepEmitter> Stepper<E> {
    pub(crate) fn from_parts(
        shared: Shared,
        emitter: E,
        options: MotionOptions,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            shared: Arc::new(shared),
            emitter,
            worker: Mutex::new(None),
            options,
            interrupt,
            observer: Mutex::new(None),
            start_hook: Mutex::new(None),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Steps per revolution.
    pub fn steps_per_revolution(&self) -> u32 {
        self.shared.steps_per_revolution()
    }

    /// Whether a new motion force-stops the running one.
    pub fn halt_on_run_while_running(&self) -> bool {
        self.options.halt_on_run_while_running
    }

    /// Interrupt handle this stepper listens to.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Install a hook run by [`start`](Self::start).
    pub fn set_start_hook<F>(&self, hook: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        *lock(&self.start_hook) = Some(Box::new(hook));
    }

    /// Install the completion observer.
    ///
    /// Called from the worker thread once per motion, with the final error
    /// or `None`, after the worker has exited. `move_*` returns after the
    /// call; `stop()` may return before it. The getters are safe to use from
    /// the observer, the lifecycle operations of this stepper are not.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(Option<&Error>) + Send + Sync + 'static,
    {
        *lock(&self.observer) = Some(Arc::new(observer));
    }

    /// Remove the completion observer.
    pub fn clear_observer(&self) {
        *lock(&self.observer) = None;
    }

    /// Lifecycle start. Runs the start hook, if any.
    pub fn start(&self) -> Result<()> {
        info!("{}: start", self.name());
        match &*lock(&self.start_hook) {
            Some(hook) => hook(),
            None => Ok(()),
        }
    }

    /// Lifecycle halt. Force-stops any motion.
    ///
    /// Returns once the worker has exited or the stop timeout elapsed.
    pub fn halt(&self) -> Result<()> {
        info!("{}: halt", self.name());
        self.stop_then("halt", || Ok(()))
    }

    /// Move by `steps`, blocking until the motion ends.
    ///
    /// The sign selects the direction, which stays in effect afterwards.
    ///
    /// # Errors
    ///
    /// - `MotorError::Disabled` when the outputs are disabled
    /// - `MotionError::NoStepsToDo` for a zero count
    /// - `MotionError::AlreadyRunning` when a motion runs and the stepper
    ///   does not halt it automatically
    /// - The first step error, unless step errors are skipped
    /// - `MotionError::Interrupted` when the interrupt is raised
    pub fn move_steps(&self, steps: i64) -> Result<()> {
        let handle = {
            let mut slot = lock(&self.worker);
            self.ensure_enabled()?;
            if steps == 0 {
                return Err(Error::Motion(MotionError::NoStepsToDo));
            }
            self.claim(&mut slot)?;
            self.emitter
                .arm_direction(&self.shared, Direction::from_steps(steps))?;

            let worker = self.spawn(Some(steps.unsigned_abs()));
            let handle = worker.handle();
            *slot = Some(worker);
            handle
        };

        // The driver lock is released so stop() can reach the worker.
        let result = handle.stop(&self.shared, false);
        let hung = matches!(result, Err(Error::Motion(MotionError::TimeoutWaitingForWorker)));
        if !hung && !handle.wait_observed(&self.shared) {
            warn!("{}: completion observer still running", self.name());
        }

        let mut slot = lock(&self.worker);
        if slot.as_ref().map_or(false, |w| handle.is(w)) {
            if let Some(worker) = slot.take() {
                if result.is_err() {
                    worker.detach();
                }
            }
        }
        result
    }

    /// Move by an angle, rounded to the nearest step.
    pub fn move_degrees(&self, degrees: impl Into<Degrees>) -> Result<()> {
        let steps = Steps::from_degrees(degrees.into(), self.steps_per_revolution());
        self.move_steps(steps.value())
    }

    /// Start an endless motion in the current direction.
    ///
    /// Returns once the first step has been attempted; a failed first step
    /// is reported by the next [`stop`](Self::stop).
    pub fn run(&self) -> Result<()> {
        let handle = {
            let mut slot = lock(&self.worker);
            self.ensure_enabled()?;
            self.claim(&mut slot)?;

            let worker = self.spawn(None);
            let handle = worker.handle();
            *slot = Some(worker);
            handle
        };

        if !handle.wait_started(&self.shared) {
            warn!("{}: first step still pending", self.name());
        }
        Ok(())
    }

    /// Force-stop the current motion.
    ///
    /// # Errors
    ///
    /// `MotionError::NotRunning` when no motion was started since the last
    /// stop. Otherwise the final error of an endless motion, or
    /// `MotionError::TimeoutWaitingForWorker`.
    pub fn stop(&self) -> Result<()> {
        let mut slot = lock(&self.worker);
        match slot.take() {
            Some(worker) => worker.stop(&self.shared, true),
            None => Err(Error::Motion(MotionError::NotRunning)),
        }
    }

    /// Emit a single step on the calling thread.
    pub fn step(&self) -> Result<()> {
        let mut slot = lock(&self.worker);
        self.ensure_enabled()?;
        if slot.as_ref().map_or(false, Worker::is_alive) {
            return Err(Error::Motion(MotionError::AlreadyRunning));
        }
        if let Some(worker) = slot.take() {
            worker.reap();
        }

        let mut emitter = self.emitter.clone();
        emitter.emit(&self.shared)
    }

    /// Whether a motion is in progress.
    pub fn is_moving(&self) -> bool {
        lock(&self.worker).as_ref().map_or(false, Worker::is_alive)
    }

    /// Lifecycle state of the current (or last uncollected) motion.
    pub fn motion_state(&self) -> MotionState {
        lock(&self.worker)
            .as_ref()
            .map_or(MotionState::Idle, Worker::state)
    }

    /// Current step index.
    ///
    /// Within `[0, steps_per_revolution)` for the commutator, unbounded for
    /// driver boards.
    pub fn current_step(&self) -> i64 {
        self.shared.lock().step_num
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.shared.lock().direction
    }

    /// Change the direction; a running motion follows on its next step.
    pub fn set_direction(&self, direction: Direction) -> Result<()> {
        self.emitter.apply_direction(&self.shared, direction)
    }

    /// Change the direction from `"forward"` or `"backward"`.
    pub fn set_direction_str(&self, direction: &str) -> Result<()> {
        self.set_direction(direction.parse()?)
    }

    /// Current speed in RPM.
    pub fn speed(&self) -> u32 {
        self.shared.lock().speed_rpm
    }

    /// Maximum speed in RPM.
    pub fn max_speed(&self) -> u32 {
        self.shared.max_rpm()
    }

    /// Change the speed; a running motion follows on its next step.
    ///
    /// # Errors
    ///
    /// `MotionError::InvalidSpeed` when `rpm` is 0 or above the maximum.
    /// The clamped speed is applied anyway.
    pub fn set_speed(&self, rpm: u32) -> Result<()> {
        let applied = self.shared.set_speed(rpm);
        if applied == rpm {
            Ok(())
        } else {
            Err(Error::Motion(MotionError::InvalidSpeed {
                requested: rpm,
                applied,
            }))
        }
    }

    /// Force-stop any motion, then run `then` before another motion can
    /// start.
    ///
    /// An error from `then` wins over the stop error, which is logged.
    pub(crate) fn stop_then<F>(&self, action: &str, then: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut slot = lock(&self.worker);
        let stopped = match slot.take() {
            Some(worker) => worker.stop(&self.shared, true),
            None => Ok(()),
        };
        if let Err(e) = then() {
            if let Err(stop) = &stopped {
                warn!("{}: stop before {} failed: {}", self.name(), action, stop);
            }
            return Err(e);
        }
        stopped
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.shared.lock().disabled {
            Err(Error::Motor(MotorError::Disabled))
        } else {
            Ok(())
        }
    }

    /// Make room for a new worker.
    fn claim(&self, slot: &mut Option<Worker>) -> Result<()> {
        match slot.take() {
            None => Ok(()),
            Some(worker) if !worker.is_alive() => {
                worker.reap();
                Ok(())
            }
            Some(worker) if self.options.halt_on_run_while_running => {
                info!("{}: halting the running motion", self.name());
                worker.stop(&self.shared, true)
            }
            Some(worker) => {
                *slot = Some(worker);
                Err(Error::Motion(MotionError::AlreadyRunning))
            }
        }
    }

    fn spawn(&self, count: Option<u64>) -> Worker {
        let motion = Motion {
            emitter: self.emitter.clone(),
            count,
            skip_step_errors: self.options.skip_step_errors,
            interrupt: self.interrupt.subscribe(),
            observer: lock(&self.observer).clone(),
        };
        Worker::spawn(Arc::clone(&self.shared), motion)
    }
}

impl<E> Drop for Stepper<E> {
    fn drop(&mut self) {
        let slot = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = slot.take() {
            worker.detach();
        }
    }
}
