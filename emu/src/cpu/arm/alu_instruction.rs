use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl Display for ArmModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Sub => "SUB",
            Self::Rsb => "RSB",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Rsc => "RSC",
            Self::Tst => "TST",
            Self::Teq => "TEQ",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mov => "MOV",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        };
        f.write_str(name)
    }
}

#[derive(Eq, PartialEq, Debug)]
pub enum AluInstructionKind {
    Logical,
    Arithmetic,
}

pub trait Kind {
    fn kind(&self) -> AluInstructionKind;
}

impl Kind for ArmModeAluInstruction {
    fn kind(&self) -> AluInstructionKind {
        use ArmModeAluInstruction::*;
        match &self {
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => AluInstructionKind::Logical,
            Sub | Rsb | Add | Adc | Sbc | Rsc | Cmp | Cmn => AluInstructionKind::Arithmetic,
        }
    }
}

impl ArmModeAluInstruction {
    /// TST, TEQ, CMP and CMN only update flags.
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

impl From<u32> for ArmModeAluInstruction {
    fn from(alu_op_code: u32) -> Self {
        use ArmModeAluInstruction::*;
        match alu_op_code & 0xF {
            0x0 => And,
            0x1 => Eor,
            0x2 => Sub,
            0x3 => Rsb,
            0x4 => Add,
            0x5 => Adc,
            0x6 => Sbc,
            0x7 => Rsc,
            0x8 => Tst,
            0x9 => Teq,
            0xA => Cmp,
            0xB => Cmn,
            0xC => Orr,
            0xD => Mov,
            0xE => Bic,
            _ => Mvn,
        }
    }
}

/// Where the shift amount of a register operand comes from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShiftOperator {
    /// 5-bit amount encoded in the opcode.
    Immediate(u32),

    /// Bottom byte of the given register.
    Register(usize),
}

/// Operand 2 of data processing and MSR.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AluSecondOperandInfo {
    Register {
        shift_op: ShiftOperator,
        shift_kind: ShiftKind,
        register: usize,
    },
    Immediate {
        base: u32,
        shift: u32,
    },
}

impl AluSecondOperandInfo {
    /// Decodes bits 0-11 (plus the `I` bit 25) of a data processing opcode.
    #[must_use]
    pub fn decode(op_code: u32) -> Self {
        if op_code.get_bit(25) {
            Self::Immediate {
                base: op_code.get_bits(0..=7),
                shift: op_code.get_bits(8..=11) * 2,
            }
        } else {
            let shift_op = if op_code.get_bit(4) {
                ShiftOperator::Register(op_code.get_bits(8..=11) as usize)
            } else {
                ShiftOperator::Immediate(op_code.get_bits(7..=11))
            };
            Self::Register {
                shift_op,
                shift_kind: ShiftKind::from(op_code.get_bits(5..=6)),
                register: op_code.get_bits(0..=3) as usize,
            }
        }
    }

    /// A register-specified shift costs an extra internal cycle and moves the PC read to +12.
    #[must_use]
    pub const fn shifts_by_register(&self) -> bool {
        matches!(
            self,
            Self::Register {
                shift_op: ShiftOperator::Register(_),
                ..
            }
        )
    }
}

impl Display for AluSecondOperandInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { base, shift } => write!(f, "#{}", base.rotate_right(*shift)),
            Self::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind: ShiftKind::Lsl,
                register,
            } => write!(f, "R{register}"),
            Self::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} #{amount}"),
            Self::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} R{rs}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrKind {
    Cpsr,
    Spsr,
}

impl From<bool> for PsrKind {
    fn from(b: bool) -> Self {
        if b { Self::Spsr } else { Self::Cpsr }
    }
}

impl Display for PsrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpsr => f.write_str("CPSR"),
            Self::Spsr => f.write_str("SPSR"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrOpKind {
    /// Move PSR into a register.
    Mrs { destination_register: usize },

    /// Move register or immediate into the PSR fields selected by `field_mask` (c, x, s, f).
    Msr {
        field_mask: u32,
        operand: AluSecondOperandInfo,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logical_instruction() {
        let instruction_kind = ArmModeAluInstruction::from(9).kind();
        assert_eq!(instruction_kind, AluInstructionKind::Logical);
    }

    #[test]
    fn test_arithmetic_instruction() {
        let instruction_kind = ArmModeAluInstruction::from(2).kind();
        assert_eq!(instruction_kind, AluInstructionKind::Arithmetic);
    }

    #[test]
    fn decode_second_operand() {
        // #0xFF ROR 8
        let op2 = AluSecondOperandInfo::decode(0x0200_04FF);
        assert_eq!(op2, AluSecondOperandInfo::Immediate { base: 0xFF, shift: 8 });
        assert_eq!(op2.to_string(), "#4278190080");

        // R2, LSR R3
        let op2 = AluSecondOperandInfo::decode(0b0011_0011_0010);
        assert_eq!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(3),
                shift_kind: ShiftKind::Lsr,
                register: 2,
            }
        );
        assert!(op2.shifts_by_register());
    }
}
