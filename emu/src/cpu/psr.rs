//! # Program Status Registers (CPSR and SPSR)
//!
//! The PSR contains condition flags (N, Z, C, V) and control bits (mode, state, interrupts).
//!
//! ```text
//! 31 30 29 28 27       8 7 6 5 4   0
//! ┌──┬──┬──┬──┬─────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved │I│F│T│Mode │
//! └──┴──┴──┴──┴─────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: See [`condition`](super::condition) for how these are tested
//! - **Mode (0-4)**: See `cpu_modes` for operating modes
//! - **T bit (5)**: ARM (0) or Thumb (1) state
//! - **I/F bits (6-7)**: IRQ/FIQ disable
//!
//! Each exception mode has a **SPSR** to save CPSR on exception entry.
//! See `register_bank` for SPSR storage.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::{condition::Condition, cpu_modes::Mode};

/// Program Status Register (CPSR or SPSR).
///
/// The `Psr` struct wraps a raw `u32` and provides type-safe accessors for
/// each field. It's used for both CPSR (current) and SPSR (saved) registers.
///
/// # Example
///
/// ```
/// use emu::cpu::psr::Psr;
///
/// let mut cpsr = Psr::default();
///
/// cpsr.set_zero_flag(true);
/// assert!(cpsr.zero_flag());
/// ```
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

/// Bits that MSR may touch in each field, indexed by the `c`, `x`, `s`, `f` mask bits.
const FIELD_MASKS: [u32; 4] = [0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0xFF00_0000];

impl Psr {
    pub(crate) fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => false,
        }
    }

    /// Builds a mask covering the PSR fields selected by an MSR field mask (bits 16-19 of the opcode).
    #[must_use]
    pub fn field_mask(fields: u32) -> u32 {
        FIELD_MASKS
            .iter()
            .enumerate()
            .filter(|(idx, _)| fields.get_bit(*idx as u8))
            .fold(0, |acc, (_, mask)| acc | mask)
    }

    /// N => Bit 31, (0=Not Signed, 1=Signed)
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30, (0=Not Zero, 1=Zero)
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28, (0=No Overflow, 1=Overflow)
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable)
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable)
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=THUMB)
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0
    ///
    /// Firmware occasionally parks garbage in an SPSR it never returns through.
    /// Invalid mode bits read back as Supervisor.
    #[must_use]
    pub fn mode(self) -> Mode {
        let mode_bits = self.0 & 0b11111;
        Mode::try_from(mode_bits).unwrap_or_else(|_| {
            tracing::debug!(
                "invalid mode bits 0b{:05b} in PSR=0x{:08X}, using Supervisor",
                mode_bits,
                self.0
            );
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Sets N, Z, C and V from an arithmetic result.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_carry_flag(op_result.carry);
        self.set_zero_flag(op_result.zero);
        self.set_sign_flag(op_result.sign);
        self.set_overflow_flag(op_result.overflow);
    }

    /// Sets N and Z from `result`, leaving C and V alone.
    pub fn set_sign_zero(&mut self, result: u32) {
        self.set_sign_flag(result.get_bit(31));
        self.set_zero_flag(result == 0);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// The Mode Bits M4-M0 contain the current operating mode.
    pub const fn set_mode(&mut self, m: Mode) {
        self.0 &= !0b1_1111;
        self.0 |= m as u32;
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);
        s.set_mode(m);
        s
    }
}

impl From<u32> for Psr {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state (ARM or Thumb).
///
/// Controlled by the T bit (bit 5) in CPSR. Switch via `BX Rn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// Thumb: 16-bit instructions. See `thumb` module.
    Thumb,
    /// ARM: 32-bit instructions. See `arm` module.
    Arm,
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_flags() {
        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        cpsr.set_carry_flag(true);
        assert!(cpsr.sign_flag());
        assert!(cpsr.carry_flag());
        assert!(!cpsr.zero_flag());
        assert_eq!(cpsr.0, 0xA000_0000);
    }

    #[test]
    fn check_overflow_flag() {
        let cpsr = Psr(0b0001_0000_0000_0000_0000_0000_0000_0000);
        assert!(cpsr.overflow_flag());
    }

    #[test]
    fn check_control_bits() {
        let mut cpsr = Psr(0);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        cpsr.set_state_bit(true);
        assert_eq!(cpsr.0, 0b1110_0000);
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_modes() {
        for (mode, bits) in [
            (Mode::User, 0b10000),
            (Mode::Fiq, 0b10001),
            (Mode::Irq, 0b10010),
            (Mode::Supervisor, 0b10011),
            (Mode::Abort, 0b10111),
            (Mode::Undefined, 0b11011),
            (Mode::System, 0b11111),
        ] {
            let mut cpsr = Psr(0xF000_00C0);
            cpsr.set_mode(mode);
            assert_eq!(cpsr.0 & 0b11111, bits);
            assert_eq!(cpsr.0 & !0b11111, 0xF000_00C0);
            assert_eq!(Psr(bits).mode(), mode);
        }
    }

    #[test]
    fn invalid_mode_reads_as_supervisor() {
        assert_eq!(Psr(0).mode(), Mode::Supervisor);
    }

    #[test]
    fn check_conditions() {
        let mut cpsr = Psr(0);
        cpsr.set_zero_flag(true);
        assert!(cpsr.can_execute(Condition::EQ));
        assert!(!cpsr.can_execute(Condition::NE));
        assert!(cpsr.can_execute(Condition::LS));
        assert!(!cpsr.can_execute(Condition::GT));
        assert!(!cpsr.can_execute(Condition::NV));

        let mut cpsr = Psr(0);
        cpsr.set_sign_flag(true);
        assert!(cpsr.can_execute(Condition::LT));
        cpsr.set_overflow_flag(true);
        assert!(cpsr.can_execute(Condition::GE));
        assert!(cpsr.can_execute(Condition::GT));
    }

    #[test]
    fn check_field_mask() {
        assert_eq!(Psr::field_mask(0b1000), 0xFF00_0000);
        assert_eq!(Psr::field_mask(0b1001), 0xFF00_00FF);
        assert_eq!(Psr::field_mask(0b1111), 0xFFFF_FFFF);
        assert_eq!(Psr::field_mask(0), 0);
    }
}
