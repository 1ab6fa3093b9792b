//! # Barrel shifter and adder
//!
//! Shared by ARM data processing and the Thumb ALU formats.
//!
//! Shift amounts come in two flavours:
//!
//! - **Immediate** (5 bits in the opcode). `LSR #0` and `ASR #0` encode a
//!   shift by 32 and `ROR #0` encodes `RRX`. [`decode_immediate_shift`]
//!   rewrites those before calling [`shift`].
//! - **Register** (bottom byte of Rs). An amount of 0 leaves the value and
//!   the carry untouched, amounts of 32 and above saturate.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

/// An immediate shift after the special encodings were resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateShift {
    Shift(ShiftKind, u32),
    RotateRightExtended,
}

/// `LSR #0`, `ASR #0` and `ROR #0` do not mean "no shift".
#[must_use]
pub const fn decode_immediate_shift(kind: ShiftKind, amount: u32) -> ImmediateShift {
    match (kind, amount) {
        (ShiftKind::Lsr | ShiftKind::Asr, 0) => ImmediateShift::Shift(kind, 32),
        (ShiftKind::Ror, 0) => ImmediateShift::RotateRightExtended,
        _ => ImmediateShift::Shift(kind, amount),
    }
}

/// Applies an immediate-form shift to `value`.
#[must_use]
pub fn shift_immediate(kind: ShiftKind, amount: u32, value: u32, carry: bool) -> ArithmeticOpResult {
    match decode_immediate_shift(kind, amount) {
        ImmediateShift::Shift(kind, amount) => shift(kind, amount, value, carry),
        ImmediateShift::RotateRightExtended => ArithmeticOpResult {
            result: (u32::from(carry) << 31) | (value >> 1),
            carry: value.get_bit(0),
            ..Default::default()
        },
    }
}

/// Barrel shifter with register-specified amount semantics.
#[must_use]
pub fn shift(kind: ShiftKind, shift_amount: u32, rm: u32, carry: bool) -> ArithmeticOpResult {
    if shift_amount == 0 {
        return ArithmeticOpResult {
            result: rm,
            carry,
            ..Default::default()
        };
    }

    let (result, carry) = match kind {
        ShiftKind::Lsl => match shift_amount {
            1..=31 => (rm << shift_amount, rm.get_bit((32 - shift_amount) as u8)),
            32 => (0, rm.get_bit(0)),
            _ => (0, false),
        },
        ShiftKind::Lsr => match shift_amount {
            1..=31 => (rm >> shift_amount, rm.get_bit((shift_amount - 1) as u8)),
            32 => (0, rm.get_bit(31)),
            _ => (0, false),
        },
        ShiftKind::Asr => match shift_amount {
            1..=31 => (
                ((rm as i32) >> shift_amount) as u32,
                rm.get_bit((shift_amount - 1) as u8),
            ),
            _ => (((rm as i32) >> 31) as u32, rm.get_bit(31)),
        },
        ShiftKind::Ror => {
            let amount = shift_amount % 32;
            if amount == 0 {
                (rm, rm.get_bit(31))
            } else {
                let result = rm.rotate_right(amount);
                (result, result.get_bit(31))
            }
        }
    };

    ArithmeticOpResult {
        result,
        carry,
        ..Default::default()
    }
}

/// `first + second + carry_in` with ARM flag semantics.
///
/// Subtraction is `first + !second + 1`, so SUB/SBC/RSB/RSC/CMP all route
/// through here and get the "carry = not borrow" convention for free.
#[must_use]
pub fn add_with_carry(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    let wide = u64::from(first_op) + u64::from(second_op) + u64::from(carry_in);
    let result = wide as u32;

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        // Operands share a sign and the result does not.
        overflow: (!(first_op ^ second_op) & (first_op ^ result)).get_bit(31),
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

#[must_use]
pub fn add(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    add_with_carry(first_op, second_op, false)
}

#[must_use]
pub fn sub(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    add_with_carry(first_op, !second_op, true)
}

/// Internal cycles spent by the multiplier array for the given `Rs`.
///
/// Signed multiplies terminate early on leading ones as well as leading zeros.
#[must_use]
pub fn multiply_cycles(rs: u32, signed: bool) -> u32 {
    let leading = |mask: u32| (rs & mask) == 0 || (signed && (rs & mask) == mask);
    if leading(0xFFFF_FF00) {
        1
    } else if leading(0xFFFF_0000) {
        2
    } else if leading(0xFF00_0000) {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_lsl() {
        let r = shift(ShiftKind::Lsl, 1, 0x8000_0001, false);
        assert_eq!(r.result, 2);
        assert!(r.carry);

        let r = shift(ShiftKind::Lsl, 32, 0x0000_0001, false);
        assert_eq!(r.result, 0);
        assert!(r.carry);

        let r = shift(ShiftKind::Lsl, 33, 0xFFFF_FFFF, true);
        assert_eq!(r.result, 0);
        assert!(!r.carry);
    }

    #[test]
    fn shift_by_zero_register_keeps_carry() {
        let r = shift(ShiftKind::Lsr, 0, 0x1234, true);
        assert_eq!(r.result, 0x1234);
        assert!(r.carry);
    }

    #[test]
    fn check_immediate_special_encodings() {
        // LSR #0 means LSR #32
        let r = shift_immediate(ShiftKind::Lsr, 0, 0x8000_0000, false);
        assert_eq!(r.result, 0);
        assert!(r.carry);

        // ASR #0 means ASR #32
        let r = shift_immediate(ShiftKind::Asr, 0, 0x8000_0000, false);
        assert_eq!(r.result, 0xFFFF_FFFF);
        assert!(r.carry);

        // ROR #0 means RRX
        let r = shift_immediate(ShiftKind::Ror, 0, 0b11, true);
        assert_eq!(r.result, 0x8000_0001);
        assert!(r.carry);

        // LSL #0 is a plain move
        let r = shift_immediate(ShiftKind::Lsl, 0, 0xF0, true);
        assert_eq!(r.result, 0xF0);
        assert!(r.carry);
    }

    #[test]
    fn check_ror() {
        let r = shift(ShiftKind::Ror, 4, 0x0000_000F, false);
        assert_eq!(r.result, 0xF000_0000);
        assert!(r.carry);

        let r = shift(ShiftKind::Ror, 32, 0x8000_0000, false);
        assert_eq!(r.result, 0x8000_0000);
        assert!(r.carry);
    }

    #[test]
    fn check_asr_large() {
        let r = shift(ShiftKind::Asr, 40, 0x7FFF_FFFF, true);
        assert_eq!(r.result, 0);
        assert!(!r.carry);
    }

    #[test]
    fn check_add_flags() {
        let r = add(0xFFFF_FFFF, 1);
        assert_eq!(r.result, 0);
        assert!(r.carry);
        assert!(r.zero);
        assert!(!r.overflow);

        let r = add(0x7FFF_FFFF, 1);
        assert!(r.overflow);
        assert!(r.sign);
        assert!(!r.carry);
    }

    #[test]
    fn check_sub_flags() {
        let r = sub(5, 5);
        assert!(r.zero);
        assert!(r.carry);

        let r = sub(3, 5);
        assert_eq!(r.result as i32, -2);
        assert!(!r.carry);
        assert!(r.sign);

        let r = sub(0x8000_0000, 1);
        assert!(r.overflow);
    }

    #[test]
    fn check_multiply_cycles() {
        assert_eq!(multiply_cycles(0xFF, false), 1);
        assert_eq!(multiply_cycles(0xFFFF_FFF0, true), 1);
        assert_eq!(multiply_cycles(0xFFFF_FFF0, false), 4);
        assert_eq!(multiply_cycles(0x1234, false), 2);
        assert_eq!(multiply_cycles(0x12_3456, false), 3);
        assert_eq!(multiply_cycles(0x1234_5678, true), 4);
    }
}
