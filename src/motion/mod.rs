//! Motion module for stepper-engine.
//!
//! Direction, coil phase tables and step timing.

mod direction;
mod phase;
pub mod timing;

pub use direction::Direction;
pub use phase::{PhaseTable, StepperMode};
