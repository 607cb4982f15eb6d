//! Motor module for stepper-engine.
//!
//! Background motion engine and its two output stages.

mod builder;
mod driver;
mod easy_driver;
mod emitter;
mod interrupt;
pub mod state;
mod stepper;
mod worker;

pub use builder::{EasyDriverBuilder, StepperDriverBuilder};
pub use driver::StepperDriver;
pub use easy_driver::EasyDriver;
pub use emitter::{Commutator, Pulser, StepEmitter};
pub use interrupt::Interrupt;
pub use state::{MotionState, Shared, StepperState};
pub use stepper::Stepper;
