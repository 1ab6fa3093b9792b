//! # Operating modes
//!
//! ```text
//! ┌────────────┬─────────┬──────────────────────────────────────────┐
//! │ Mode       │ M4..M0  │ Private registers                        │
//! ├────────────┼─────────┼──────────────────────────────────────────┤
//! │ User       │ 10000   │ -                                        │
//! │ FIQ        │ 10001   │ R8_fiq..R14_fiq, SPSR_fiq                │
//! │ IRQ        │ 10010   │ R13_irq, R14_irq, SPSR_irq               │
//! │ Supervisor │ 10011   │ R13_svc, R14_svc, SPSR_svc               │
//! │ Abort      │ 10111   │ R13_abt, R14_abt, SPSR_abt               │
//! │ Undefined  │ 11011   │ R13_und, R14_und, SPSR_und               │
//! │ System     │ 11111   │ shares the User registers                │
//! └────────────┴─────────┴──────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// The normal ARM program execution state.
    User = 0b10000,

    /// Designed to support a data transfer or channel process.
    Fiq = 0b10001,

    /// Used for general-purpose interrupt handling.
    Irq = 0b10010,

    /// Protected mode for the operating system
    Supervisor = 0b10011,

    /// Entered after a data or instruction prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed
    Undefined = 0b11011,

    /// A privileged user mode for the operating system.
    System = 0b11111,
}

impl Mode {
    /// Every mode except User may touch the control bits of the CPSR.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }

    /// User and System have no SPSR.
    #[must_use]
    pub const fn has_spsr(self) -> bool {
        !matches!(self, Self::User | Self::System)
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = String;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(format!("Unexpected value for Mode: 0b{n:05b}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_mode_roundtrip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::try_from(u32::from(mode)), Ok(mode));
        }
        assert!(Mode::try_from(0).is_err());
    }

    #[test]
    fn check_privilege() {
        assert!(!Mode::User.is_privileged());
        assert!(Mode::System.is_privileged());
        assert!(!Mode::System.has_spsr());
        assert!(Mode::Irq.has_spsr());
    }
}
