//! # stepper-engine
//!
//! Cancellable stepper motor motion engine for 4-wire steppers and STEP/DIR
//! driver boards.
//!
//! ## Features
//!
//! - **Two output stages**: four-phase commutation (single-phase, dual-phase,
//!   half-step) or STEP pulses to an EasyDriver-style board
//! - **Background motion**: counted moves, angular moves and endless runs on a
//!   worker thread, with direction and speed changes while running
//! - **Precise stops**: once `stop()` returns, no further writes happen
//! - **Configuration-driven**: define steppers in TOML files
//! - **embedded-hal 1.0**: `PinState` levels, `OutputPin` banks, `DelayNs` timing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stepper_engine::{load_config, PinBank, StdDelay, StepperDriver};
//!
//! let config = load_config("steppers.toml")?;
//! let bank = Arc::new(PinBank::new().with_pin("A", a)?.with_pin("B", b)?
//!     .with_pin("C", c)?.with_pin("D", d)?);
//!
//! let pan = StepperDriver::builder()
//!     .from_config(&config, "pan")?
//!     .writer(bank)
//!     .delay(StdDelay::new())
//!     .build()?;
//!
//! pan.move_degrees(90.0_f32)?;
//! pan.run()?;
//! pan.stop()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables the motion engine, file I/O and TOML parsing
//! - `ctrlc` (default): Ctrl-C / SIGINT interrupts running motions
//! - `alloc`: Enables heap allocation for no_std with allocator
//! - `defmt`: Enables defmt formatting for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod config;
pub mod error;
pub mod motion;
#[cfg(feature = "std")]
pub mod motor;
pub mod output;

// Re-exports for ergonomic API
pub use config::{validate_config, DriverConfig, DriverKind, StepperConfig, SystemConfig};
pub use error::{Error, Result};
pub use motion::{Direction, PhaseTable, StepperMode};
pub use output::DigitalWriter;

#[cfg(feature = "std")]
pub use motor::{
    EasyDriver, EasyDriverBuilder, Interrupt, MotionState, Stepper, StepperDriver,
    StepperDriverBuilder,
};
#[cfg(feature = "std")]
pub use output::{PinBank, StdDelay};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{Degrees, Rpm, Steps};
