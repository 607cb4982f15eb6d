//! Process interrupt delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(feature = "ctrlc")]
use crate::error::{short_string, Error, MotionError, Result};

/// Broadcast interrupt handle.
///
/// Every worker alive when the handle is raised exits with
/// `MotionError::Interrupted`; motions started afterwards are unaffected.
///
/// With the `ctrlc` feature (on by default) the first call to
/// [`global`](Self::global) installs a Ctrl-C / SIGINT handler that raises
/// the global handle. Hosts with their own signal handling disable the
/// feature and call [`raise`](Self::raise) themselves.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    generation: Arc<AtomicU64>,
}

fn process() -> &'static Interrupt {
    static GLOBAL: OnceLock<Interrupt> = OnceLock::new();
    GLOBAL.get_or_init(Interrupt::new)
}

impl Interrupt {
    /// Create a handle not shared with anything else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide handle used by steppers unless configured otherwise.
    pub fn global() -> Self {
        #[cfg(feature = "ctrlc")]
        {
            // failures are logged once by install_ctrlc
            let _ = Self::install_ctrlc();
        }
        process().clone()
    }

    /// Install the Ctrl-C / SIGINT handler that raises the global handle.
    ///
    /// Runs once per process; later calls return the first outcome.
    ///
    /// # Errors
    ///
    /// `MotionError::InterruptHandler` when another handler is already
    /// installed or the OS refuses the registration.
    #[cfg(feature = "ctrlc")]
    pub fn install_ctrlc() -> Result<()> {
        static INSTALLED: OnceLock<Result<()>> = OnceLock::new();
        INSTALLED
            .get_or_init(|| {
                let interrupt = process().clone();
                let installed = ctrlc::set_handler(move || {
                    log::warn!("interrupt received, stopping motions");
                    interrupt.raise();
                });
                match installed {
                    Ok(()) => {
                        log::debug!("interrupt handler installed");
                        Ok(())
                    }
                    Err(e) => {
                        log::warn!("cannot install interrupt handler: {}", e);
                        Err(Error::Motion(MotionError::InterruptHandler(short_string(
                            &e.to_string(),
                        ))))
                    }
                }
            })
            .clone()
    }

    /// Interrupt every motion currently running.
    pub fn raise(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot taken when a motion starts.
    pub(crate) fn subscribe(&self) -> Subscription {
        Subscription {
            interrupt: self.clone(),
            seen: self.generation.load(Ordering::Acquire),
        }
    }
}

/// A worker's view of an [`Interrupt`].
#[derive(Debug)]
pub(crate) struct Subscription {
    interrupt: Interrupt,
    seen: u64,
}

impl Subscription {
    /// Whether the interrupt was raised since subscribing.
    pub(crate) fn is_raised(&self) -> bool {
        self.interrupt.generation.load(Ordering::Acquire) != self.seen
    }
}
