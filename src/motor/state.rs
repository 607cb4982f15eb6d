//! Stepper state shared between the caller and the motion worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::motion::timing;
use crate::motion::Direction;

/// Values guarded by the value-mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepperState {
    /// Current step index.
    pub step_num: i64,
    /// Direction of the next step.
    pub direction: Direction,
    /// Speed in RPM, within `[1, max_rpm]`.
    pub speed_rpm: u32,
    /// Outputs disabled through the enable pin.
    pub disabled: bool,
    /// Driver board put to sleep through the sleep pin.
    pub sleeping: bool,
}

/// Motor constants plus the value-mutex.
///
/// Only constructed by the stepper; emitters receive it by reference.
#[derive(Debug)]
pub struct Shared {
    name: heapless::String<32>,
    steps_per_revolution: u32,
    max_rpm: u32,
    state: Mutex<StepperState>,
    // mirrors speed_rpm so timeouts never wait on a step in progress
    delay_us: AtomicU64,
}

impl Shared {
    pub(crate) fn new(
        name: heapless::String<32>,
        steps_per_revolution: u32,
        max_rpm: u32,
        speed_rpm: u32,
    ) -> Self {
        let speed_rpm = speed_rpm.clamp(1, max_rpm);
        Self {
            name,
            steps_per_revolution,
            max_rpm,
            state: Mutex::new(StepperState {
                step_num: 0,
                direction: Direction::Forward,
                speed_rpm,
                disabled: false,
                sleeping: false,
            }),
            delay_us: AtomicU64::new(timing::delay_per_step_us(steps_per_revolution, speed_rpm)),
        }
    }

    /// Device name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Steps per revolution.
    #[inline]
    pub fn steps_per_revolution(&self) -> u32 {
        self.steps_per_revolution
    }

    /// Maximum speed in RPM.
    #[inline]
    pub fn max_rpm(&self) -> u32 {
        self.max_rpm
    }

    /// Acquire the value-mutex.
    ///
    /// A worker that panicked while holding the lock leaves plain data
    /// behind, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, StepperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> StepperState {
        *self.lock()
    }

    /// Delay per step at the current speed, in microseconds.
    ///
    /// Does not take the value-mutex.
    pub fn delay_per_step_us(&self) -> u64 {
        self.delay_us.load(Ordering::Acquire)
    }

    /// Set the speed, clamped into `[1, max_rpm]`. Returns the applied speed.
    pub(crate) fn set_speed(&self, rpm: u32) -> u32 {
        let applied = rpm.clamp(1, self.max_rpm);
        let mut state = self.lock();
        state.speed_rpm = applied;
        self.delay_us.store(
            timing::delay_per_step_us(self.steps_per_revolution, applied),
            Ordering::Release,
        );
        applied
    }
}

/// Lifecycle of a motion worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// No worker.
    Idle,
    /// Worker spawned, first step not yet attempted.
    Arming,
    /// Emitting steps.
    Running,
    /// Counted move completed.
    Finished,
    /// Worker exited with an error.
    Errored,
    /// Worker exited on a stop request.
    Stopped,
}

impl MotionState {
    /// State name for display/debugging.
    pub fn name(self) -> &'static str {
        match self {
            MotionState::Idle => "Idle",
            MotionState::Arming => "Arming",
            MotionState::Running => "Running",
            MotionState::Finished => "Finished",
            MotionState::Errored => "Errored",
            MotionState::Stopped => "Stopped",
        }
    }

    /// Whether the worker has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MotionState::Finished | MotionState::Errored | MotionState::Stopped
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => MotionState::Arming,
            2 => MotionState::Running,
            3 => MotionState::Finished,
            4 => MotionState::Errored,
            5 => MotionState::Stopped,
            _ => MotionState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_speed_is_clamped() {
        let shared = Shared::new(heapless::String::try_from("m").unwrap(), 200, 210, 0);
        assert_eq!(shared.snapshot().speed_rpm, 1);

        let shared = Shared::new(heapless::String::try_from("m").unwrap(), 200, 210, 500);
        assert_eq!(shared.snapshot().speed_rpm, 210);
        assert_eq!(shared.delay_per_step_us(), 1_428);

        assert_eq!(shared.set_speed(60), 60);
        assert_eq!(shared.delay_per_step_us(), 5_000);
        assert_eq!(shared.set_speed(1_000), 210);
    }

    #[test]
    fn test_motion_state_round_trips_through_u8() {
        for state in [
            MotionState::Idle,
            MotionState::Arming,
            MotionState::Running,
            MotionState::Finished,
            MotionState::Errored,
            MotionState::Stopped,
        ] {
            assert_eq!(MotionState::from_u8(state.as_u8()), state);
        }
        assert!(MotionState::Stopped.is_terminal());
        assert!(!MotionState::Running.is_terminal());
    }
}
