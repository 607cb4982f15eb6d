//! Digital output capability consumed by the steppers.
//!
//! The steppers address outputs by opaque pin identifiers and never interpret
//! them. Hosts implement [`DigitalWriter`] directly, or wrap embedded-hal
//! pins in a [`PinBank`] (std only).

use core::fmt::{self, Write};

use embedded_hal::digital::PinState;

use crate::error::{short_string, Error, MotorError, Result};

#[cfg(feature = "std")]
mod bank;
#[cfg(feature = "std")]
mod delay;

#[cfg(feature = "std")]
pub use bank::{PinBank, PinBankError};
#[cfg(feature = "std")]
pub use delay::StdDelay;

/// Sink for digital output levels.
///
/// A write must be visible at the hardware before the next write returns.
/// There is no batching and no atomicity across pins.
pub trait DigitalWriter: Send + Sync {
    /// Error reported by the sink.
    type Error: fmt::Debug;

    /// Drive `pin` to `level`.
    fn digital_write(&self, pin: &str, level: PinState) -> core::result::Result<(), Self::Error>;
}

/// Write a level and convert sink failures into [`MotorError::WriteFailed`].
pub(crate) fn write_pin<W>(writer: &W, pin: &str, level: PinState) -> Result<()>
where
    W: DigitalWriter + ?Sized,
{
    writer.digital_write(pin, level).map_err(|e| {
        let mut detail = heapless::String::<64>::new();
        // truncated on overflow
        let _ = write!(detail, "{:?}", e);
        Error::Motor(MotorError::WriteFailed {
            pin: short_string(pin),
            detail,
        })
    })
}
