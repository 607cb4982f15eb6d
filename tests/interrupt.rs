//! Ctrl-C delivery through the global interrupt.
//!
//! Lives in its own test binary: raising the global handle interrupts every
//! motion of the process.

#![cfg(all(unix, feature = "ctrlc"))]

mod common;

use std::process::Command;
use std::time::{Duration, Instant};

use stepper_engine::error::MotionError;
use stepper_engine::{Error, Interrupt, MotionState, StdDelay, StepperDriver};

use common::{Recorder, PINS};

#[test]
fn sigint_interrupts_running_motion() {
    let recorder = Recorder::new();
    // no explicit interrupt: the stepper listens to the global one
    let stepper = StepperDriver::builder()
        .writer(recorder.clone())
        .delay(StdDelay::new())
        .pins(PINS)
        .steps_per_revolution(200)
        .speed_rpm(60)
        .build()
        .unwrap();
    assert_eq!(Interrupt::install_ctrlc(), Ok(()));

    stepper.run().unwrap();
    let status = Command::new("kill")
        .arg("-INT")
        .arg(std::process::id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(2);
    while stepper.is_moving() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(!stepper.is_moving());
    assert_eq!(stepper.motion_state(), MotionState::Errored);
    assert_eq!(stepper.stop(), Err(Error::Motion(MotionError::Interrupted)));

    // the process survived the signal and later motions run normally
    stepper.move_steps(2).unwrap();
}
