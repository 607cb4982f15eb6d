//! Coil energization tables for 4-wire steppers.
//!
//! Each row is a nibble: bit `i` is the level of `pins[i]`.

use embedded_hal::digital::PinState;
use serde::Deserialize;

const fn row(p0: u8, p1: u8, p2: u8, p3: u8) -> u8 {
    p0 | (p1 << 1) | (p2 << 2) | (p3 << 3)
}

const SINGLE_PHASE_ROWS: [u8; 4] = [
    row(1, 0, 0, 0),
    row(0, 1, 0, 0),
    row(0, 0, 1, 0),
    row(0, 0, 0, 1),
];

const DUAL_PHASE_ROWS: [u8; 4] = [
    row(1, 0, 0, 1),
    row(1, 1, 0, 0),
    row(0, 1, 1, 0),
    row(0, 0, 1, 1),
];

const HALF_STEP_ROWS: [u8; 8] = [
    row(1, 0, 0, 1),
    row(1, 0, 0, 0),
    row(1, 1, 0, 0),
    row(0, 1, 0, 0),
    row(0, 1, 1, 0),
    row(0, 0, 1, 0),
    row(0, 0, 1, 1),
    row(0, 0, 0, 1),
];

/// An ordered cycle of coil patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTable {
    rows: &'static [u8],
}

impl PhaseTable {
    /// One coil at a time, 4 steps per cycle, lower torque.
    pub const SINGLE_PHASE: Self = Self {
        rows: &SINGLE_PHASE_ROWS,
    };

    /// Two coils at a time, 4 steps per cycle, higher torque and current.
    pub const DUAL_PHASE: Self = Self {
        rows: &DUAL_PHASE_ROWS,
    };

    /// Alternating one and two coils, 8 steps per cycle.
    pub const HALF_STEP: Self = Self {
        rows: &HALF_STEP_ROWS,
    };

    /// Number of rows in the cycle.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false for the built-in tables.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw nibble for a step index, wrapping modulo the table length.
    #[inline]
    pub fn row(&self, step: usize) -> u8 {
        self.rows[step % self.rows.len()]
    }

    /// Pin levels for a step index, in `pins[0..3]` order.
    pub fn levels(&self, step: usize) -> [PinState; 4] {
        let row = self.row(step);
        let mut levels = [PinState::Low; 4];
        for (bit, level) in levels.iter_mut().enumerate() {
            *level = PinState::from(row & (1 << bit) != 0);
        }
        levels
    }
}

/// Stepping mode of a 4-wire stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperMode {
    /// See [`PhaseTable::SINGLE_PHASE`].
    SinglePhase,
    /// See [`PhaseTable::DUAL_PHASE`].
    #[default]
    DualPhase,
    /// See [`PhaseTable::HALF_STEP`].
    HalfStep,
}

impl StepperMode {
    /// Phase table for this mode.
    pub fn table(self) -> PhaseTable {
        match self {
            StepperMode::SinglePhase => PhaseTable::SINGLE_PHASE,
            StepperMode::DualPhase => PhaseTable::DUAL_PHASE,
            StepperMode::HalfStep => PhaseTable::HALF_STEP,
        }
    }
}

impl From<StepperMode> for PhaseTable {
    fn from(mode: StepperMode) -> Self {
        mode.table()
    }
}
