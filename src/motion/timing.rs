//! Step timing.
//!
//! All delays are integer microseconds; a millisecond scheduler would distort
//! slow speeds.

use core::time::Duration;

/// Conservative step rate ceiling for an unramped stepper.
pub const DEFAULT_MAX_STEPS_PER_SECOND: u32 = 700;

/// Safety margin added to every stop timeout.
pub const STOP_TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

/// Maximum speed in RPM for a motor resolution and step rate ceiling.
///
/// Never less than 1.
pub fn max_rpm(steps_per_revolution: u32, max_steps_per_second: u32) -> u32 {
    let rpm = 60 * u64::from(max_steps_per_second) / u64::from(steps_per_revolution.max(1));
    rpm.clamp(1, u64::from(u32::MAX)) as u32
}

/// Time between two steps in microseconds.
///
/// `60 s / (steps_per_revolution * rpm)`; a zero speed is treated as 1 RPM.
pub fn delay_per_step_us(steps_per_revolution: u32, rpm: u32) -> u64 {
    let steps_per_minute = u64::from(steps_per_revolution.max(1)) * u64::from(rpm.max(1));
    60_000_000 / steps_per_minute
}

/// Upper bound on how long a worker with `remaining` steps may take to exit.
///
/// `2 * remaining * delay + 100 ms`.
pub fn stop_timeout(remaining: u64, delay_us: u64) -> Duration {
    let budget_us = remaining.saturating_mul(delay_us).saturating_mul(2);
    Duration::from_micros(budget_us).saturating_add(STOP_TIMEOUT_MARGIN)
}
