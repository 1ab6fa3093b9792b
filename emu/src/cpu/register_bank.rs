//! # Banked Registers for Exception Modes
//!
//! Storage for registers that are swapped when changing CPU modes.
//! See [`cpu_modes`](super::cpu_modes) for the banking table.
//!
//! Each exception mode has its own R13 (SP), R14 (LR), and SPSR.
//! FIQ additionally banks R8-R12 for faster interrupt handling.
//! User and System share one set and have no SPSR.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::Psr;

/// Index of the SP/LR/SPSR shadow set owned by a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankIndex {
    User = 0,
    Fiq = 1,
    Irq = 2,
    Supervisor = 3,
    Abort = 4,
    Undefined = 5,
}

impl From<Mode> for BankIndex {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::User | Mode::System => Self::User,
            Mode::Fiq => Self::Fiq,
            Mode::Irq => Self::Irq,
            Mode::Supervisor => Self::Supervisor,
            Mode::Abort => Self::Abort,
            Mode::Undefined => Self::Undefined,
        }
    }
}

/// Registers of every mode that are not currently visible.
///
/// The register file always holds the active mode's values; on a switch the
/// outgoing values are parked here and the incoming ones are loaded.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    /// R8-R12 of every mode except FIQ.
    pub r8_r12_usr: [u32; 5],

    /// R8-R12 for FIQ mode.
    pub r8_r12_fiq: [u32; 5],

    /// R13 (SP) and R14 (LR) per [`BankIndex`].
    pub sp_lr: [[u32; 2]; 6],

    /// SPSR per [`BankIndex`]. The User slot is never read.
    pub spsr: [Psr; 6],
}

impl RegisterBank {
    #[must_use]
    pub fn spsr(&self, mode: Mode) -> Option<Psr> {
        mode.has_spsr()
            .then(|| self.spsr[BankIndex::from(mode) as usize])
    }

    pub fn set_spsr(&mut self, mode: Mode, value: Psr) {
        if mode.has_spsr() {
            self.spsr[BankIndex::from(mode) as usize] = value;
        }
    }
}
