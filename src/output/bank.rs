//! Named embedded-hal output pins behind a [`DigitalWriter`].

use std::sync::{Mutex, PoisonError};

use embedded_hal::digital::{Error as _, ErrorKind, OutputPin, PinState};
use heapless::{FnvIndexMap, String};

use crate::error::{short_string, ConfigError, Error, Result};

use super::DigitalWriter;

/// Maximum number of pins in a bank.
pub const MAX_PINS: usize = 16;

/// Errors reported by a [`PinBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinBankError {
    /// No pin registered under the requested identifier.
    UnknownPin,
    /// The underlying pin failed.
    Pin(ErrorKind),
}

/// A set of embedded-hal output pins addressed by identifier.
///
/// # Example
///
/// ```rust,ignore
/// let bank = PinBank::new()
///     .with_pin("A", coil_a)?
///     .with_pin("B", coil_b)?;
/// ```
pub struct PinBank<P> {
    pins: Mutex<FnvIndexMap<String<32>, P, MAX_PINS>>,
}

impl<P> Default for PinBank<P>
where
    P: OutputPin + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PinBank<P>
where
    P: OutputPin + Send,
{
    /// Create an empty bank.
    pub fn new() -> Self {
        Self {
            pins: Mutex::new(FnvIndexMap::new()),
        }
    }

    /// Register a pin under `id`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPin` if the identifier is empty, too long,
    /// already taken, or the bank is full.
    pub fn with_pin(self, id: &str, pin: P) -> Result<Self> {
        let invalid = || Error::Config(ConfigError::InvalidPin(short_string(id)));
        let key = String::try_from(id).map_err(|_| invalid())?;
        {
            let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
            if key.is_empty() || pins.contains_key(&key) {
                return Err(invalid());
            }
            pins.insert(key, pin).map_err(|_| invalid())?;
        }
        Ok(self)
    }

    /// Number of registered pins.
    pub fn len(&self) -> usize {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no pin is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give the pins back, in registration order.
    pub fn into_pins(self) -> FnvIndexMap<String<32>, P, MAX_PINS> {
        self.pins.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P> DigitalWriter for PinBank<P>
where
    P: OutputPin + Send,
{
    type Error = PinBankError;

    fn digital_write(&self, pin: &str, level: PinState) -> core::result::Result<(), Self::Error> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        let output = pins
            .iter_mut()
            .find(|(k, _)| k.as_str() == pin)
            .map(|(_, v)| v)
            .ok_or(PinBankError::UnknownPin)?;
        output
            .set_state(level)
            .map_err(|e| PinBankError::Pin(e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as MockState, Transaction as PinTransaction,
    };

    #[test]
    fn test_writes_reach_the_named_pin() {
        let a = PinMock::new(&[
            PinTransaction::set(MockState::High),
            PinTransaction::set(MockState::Low),
        ]);
        let b = PinMock::new(&[PinTransaction::set(MockState::High)]);

        let bank = PinBank::new()
            .with_pin("A", a)
            .unwrap()
            .with_pin("B", b)
            .unwrap();

        bank.digital_write("A", PinState::High).unwrap();
        bank.digital_write("B", PinState::High).unwrap();
        bank.digital_write("A", PinState::Low).unwrap();

        let mut pins = bank.into_pins();
        for (_, pin) in pins.iter_mut() {
            pin.done();
        }
    }

    #[test]
    fn test_unknown_pin() {
        let bank: PinBank<PinMock> = PinBank::new();
        assert_eq!(
            bank.digital_write("Z", PinState::High),
            Err(PinBankError::UnknownPin)
        );
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        struct NullPin;

        impl embedded_hal::digital::ErrorType for NullPin {
            type Error = core::convert::Infallible;
        }

        impl OutputPin for NullPin {
            fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
                Ok(())
            }

            fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
                Ok(())
            }
        }

        let bank = PinBank::new().with_pin("A", NullPin).unwrap();
        assert!(matches!(
            bank.with_pin("A", NullPin),
            Err(Error::Config(ConfigError::InvalidPin(_)))
        ));
        assert!(matches!(
            PinBank::new().with_pin("", NullPin),
            Err(Error::Config(ConfigError::InvalidPin(_)))
        ));
    }
}
