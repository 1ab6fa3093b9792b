//! # ARM Instruction Decoding
//!
//! This module handles decoding 32-bit ARM instructions into their component
//! fields and classifying them by type.
//!
//! ## Decoding Priority
//!
//! Several classes share the `000` space of bits 27-25, so the decoder checks
//! the most specific patterns first:
//!
//! 1. Branch and Exchange (BX)
//! 2. Multiply (MUL, MLA)
//! 3. Multiply Long (UMULL, SMULL, UMLAL, SMLAL)
//! 4. Single Data Swap (SWP/SWPB)
//! 5. Halfword Data Transfer (LDRH, STRH, LDRSB, LDRSH)
//! 6. PSR Transfer (MRS, MSR)
//! 7. Data Processing
//! 8. Undefined (`011` with bit 4 set)
//! 9. Single Data Transfer (LDR, STR)
//! 10. Block Data Transfer (LDM, STM)
//! 11. Branch (B, BL)
//! 12. Software Interrupt (SWI)
//! 13. Coprocessor operations (no coprocessor is attached, they trap as undefined)
//!
//! ## Instruction Encoding Example
//!
//! ```text
//! ADD R0, R1, R2, LSL #3
//!
//! 31-28  27-26  25  24-21  20  19-16  15-12  11-7   6-5  4  3-0
//! [1110] [ 00 ] [0] [0100] [0] [0001] [0000] [00011][00] [0][0010]
//!   ↑       ↑    ↑    ↑     ↑    ↑      ↑      ↑     ↑   ↑   ↑
//!   │       │    │    │     │    │      │      │     │   │   └─ Rm = R2
//!   │       │    │    │     │    │      │      │     │   └──── Shift by imm
//!   │       │    │    │     │    │      │      │     └──────── LSL
//!   │       │    │    │     │    │      │      └────────────── Shift = 3
//!   │       │    │    │     │    │      └───────────────────── Rd = R0
//!   │       │    │    │     │    └──────────────────────────── Rn = R1
//!   │       │    │    │     └───────────────────────────────── S = 0 (no flags)
//!   │       │    │    └─────────────────────────────────────── ADD opcode
//!   │       │    └──────────────────────────────────────────── Register operand
//!   │       └───────────────────────────────────────────────── Data processing
//!   └───────────────────────────────────────────────────────── Always execute
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstruction, PsrKind, PsrOpKind,
};
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    ReadWriteKind, ShiftKind,
};

/// The type of single data transfer operation (LDR/STR), from the L bit (bit 20).
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum SingleDataTransferKind {
    /// Load from memory into a register (`LDR`).
    Ldr,

    /// Store from a register into memory (`STR`).
    Str,
}

impl From<u32> for SingleDataTransferKind {
    fn from(op_code: u32) -> Self {
        if op_code.get_bit(20) { Self::Ldr } else { Self::Str }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyVariant {
    Mul,
    Mla,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyLongVariant {
    Umull,
    Umlal,
    Smull,
    Smlal,
}

impl ArmModeMultiplyLongVariant {
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Smull | Self::Smlal)
    }

    #[must_use]
    pub const fn accumulates(self) -> bool {
        matches!(self, Self::Umlal | Self::Smlal)
    }
}

/// All ARM instruction types after decoding.
///
/// | Variant                | Example Instructions       |
/// |------------------------|----------------------------|
/// | `DataProcessing`       | AND, ADD, CMP, MOV         |
/// | `Multiply`             | MUL, MLA                   |
/// | `MultiplyLong`         | UMULL, SMULL               |
/// | `PsrTransfer`          | MRS, MSR                   |
/// | `SingleDataSwap`       | SWP, SWPB                  |
/// | `BranchAndExchange`    | BX                         |
/// | `HalfwordDataTransfer` | LDRH, STRH, LDRSB          |
/// | `SingleDataTransfer`   | LDR, STR, LDRB             |
/// | `BlockDataTransfer`    | LDM, STM                   |
/// | `Branch`               | B, BL                      |
/// | `SoftwareInterrupt`    | SWI                        |
/// | `Coprocessor`          | CDP, LDC, STC, MRC, MCR    |
/// | `Undefined`            | -                          |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    },
    Multiply {
        variant: ArmModeMultiplyVariant,
        should_set_codes: bool,
        rd_destination_register: usize,
        rn_accumulate_register: usize,
        rs_operand_register: usize,
        rm_operand_register: usize,
    },
    MultiplyLong {
        variant: ArmModeMultiplyLongVariant,
        should_set_codes: bool,
        rdhi_destination_register: usize,
        rdlo_destination_register: usize,
        rs_operand_register: usize,
        rm_operand_register: usize,
    },
    PsrTransfer {
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    SingleDataSwap {
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    },
    BranchAndExchange {
        register: usize,
    },
    HalfwordDataTransfer {
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: usize,
        source_destination_register: usize,
        transfer_kind: HalfwordTransferKind,
    },
    SingleDataTransfer {
        kind: SingleDataTransferKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: usize,
        base_register: usize,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    },
    BlockDataTransfer {
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: usize,
        register_list: u16,
    },
    Branch {
        link: bool,
        offset: u32,
    },
    SoftwareInterrupt {
        comment: u32,
    },
    Coprocessor,
    Undefined,
}

impl From<u32> for ArmModeInstruction {
    fn from(op_code: u32) -> Self {
        use ArmModeInstruction::*;

        let rn = op_code.get_bits(16..=19) as usize;
        let rd = op_code.get_bits(12..=15) as usize;
        let rs = op_code.get_bits(8..=11) as usize;
        let rm = op_code.get_bits(0..=3) as usize;

        if op_code.get_bits(4..=27) == 0x12_FFF1 {
            BranchAndExchange { register: rm }
        } else if op_code.get_bits(22..=27) == 0 && op_code.get_bits(4..=7) == 0b1001 {
            Multiply {
                variant: if op_code.get_bit(21) {
                    ArmModeMultiplyVariant::Mla
                } else {
                    ArmModeMultiplyVariant::Mul
                },
                should_set_codes: op_code.get_bit(20),
                rd_destination_register: rn,
                rn_accumulate_register: rd,
                rs_operand_register: rs,
                rm_operand_register: rm,
            }
        } else if op_code.get_bits(23..=27) == 0b00001 && op_code.get_bits(4..=7) == 0b1001 {
            let variant = match (op_code.get_bit(22), op_code.get_bit(21)) {
                (false, false) => ArmModeMultiplyLongVariant::Umull,
                (false, true) => ArmModeMultiplyLongVariant::Umlal,
                (true, false) => ArmModeMultiplyLongVariant::Smull,
                (true, true) => ArmModeMultiplyLongVariant::Smlal,
            };
            MultiplyLong {
                variant,
                should_set_codes: op_code.get_bit(20),
                rdhi_destination_register: rn,
                rdlo_destination_register: rd,
                rs_operand_register: rs,
                rm_operand_register: rm,
            }
        } else if op_code.get_bits(23..=27) == 0b00010
            && op_code.get_bits(20..=21) == 0
            && op_code.get_bits(4..=11) == 0b0000_1001
        {
            SingleDataSwap {
                quantity: op_code.get_bit(22).into(),
                rn,
                rd,
                rm,
            }
        } else if op_code.get_bits(25..=27) == 0 && op_code.get_bit(7) && op_code.get_bit(4) {
            let sh = op_code.get_bits(5..=6);
            if sh == 0 {
                return Undefined;
            }
            let offset_kind = if op_code.get_bit(22) {
                HalfwordDataTransferOffsetKind::Immediate {
                    offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
                }
            } else {
                HalfwordDataTransferOffsetKind::Register {
                    register: rm as u32,
                }
            };
            HalfwordDataTransfer {
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                write_back: op_code.get_bit(21),
                load_store_kind: op_code.get_bit(20).into(),
                offset_kind,
                base_register: rn,
                source_destination_register: rd,
                transfer_kind: HalfwordTransferKind::from_sh(sh),
            }
        } else if op_code.get_bits(26..=27) == 0
            && op_code.get_bits(23..=24) == 0b10
            && !op_code.get_bit(20)
        {
            let psr_kind = op_code.get_bit(22).into();
            if op_code.get_bit(21) {
                PsrTransfer {
                    psr_kind,
                    kind: PsrOpKind::Msr {
                        field_mask: op_code.get_bits(16..=19),
                        operand: AluSecondOperandInfo::decode(op_code),
                    },
                }
            } else if op_code.get_bit(25) {
                Undefined
            } else {
                PsrTransfer {
                    psr_kind,
                    kind: PsrOpKind::Mrs {
                        destination_register: rd,
                    },
                }
            }
        } else if op_code.get_bits(26..=27) == 0 {
            DataProcessing {
                alu_instruction: ArmModeAluInstruction::from(op_code.get_bits(21..=24)),
                set_conditions: op_code.get_bit(20),
                rn,
                destination: rd,
                op2: AluSecondOperandInfo::decode(op_code),
            }
        } else if op_code.get_bits(25..=27) == 0b011 && op_code.get_bit(4) {
            Undefined
        } else if op_code.get_bits(26..=27) == 0b01 {
            let offset_info = if op_code.get_bit(25) {
                SingleDataTransferOffsetInfo::RegisterImmediate {
                    shift_amount: op_code.get_bits(7..=11),
                    shift_kind: ShiftKind::from(op_code.get_bits(5..=6)),
                    reg_offset: rm,
                }
            } else {
                SingleDataTransferOffsetInfo::Immediate {
                    offset: op_code.get_bits(0..=11),
                }
            };
            SingleDataTransfer {
                kind: SingleDataTransferKind::from(op_code),
                quantity: op_code.get_bit(22).into(),
                write_back: op_code.get_bit(21),
                indexing: op_code.get_bit(24).into(),
                rd,
                base_register: rn,
                offset_info,
                offsetting: op_code.get_bit(23).into(),
            }
        } else if op_code.get_bits(25..=27) == 0b100 {
            BlockDataTransfer {
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                load_psr: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn,
                register_list: op_code.get_bits(0..=15) as u16,
            }
        } else if op_code.get_bits(25..=27) == 0b101 {
            Branch {
                link: op_code.get_bit(24),
                offset: op_code.get_bits(0..=23).sign_extended(24) << 2,
            }
        } else if op_code.get_bits(24..=27) == 0b1111 {
            SoftwareInterrupt {
                comment: op_code.get_bits(0..=23),
            }
        } else {
            Coprocessor
        }
    }
}

impl std::fmt::Display for ArmModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => {
                let s = if *set_conditions && alu_instruction.writes_result() {
                    "S"
                } else {
                    ""
                };
                match alu_instruction {
                    ArmModeAluInstruction::Mov | ArmModeAluInstruction::Mvn => {
                        write!(f, "{alu_instruction}{s} R{destination}, {op2}")
                    }
                    ArmModeAluInstruction::Tst
                    | ArmModeAluInstruction::Teq
                    | ArmModeAluInstruction::Cmp
                    | ArmModeAluInstruction::Cmn => write!(f, "{alu_instruction} R{rn}, {op2}"),
                    _ => write!(f, "{alu_instruction}{s} R{destination}, R{rn}, {op2}"),
                }
            }
            Self::Multiply {
                variant,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => match variant {
                ArmModeMultiplyVariant::Mul => write!(
                    f,
                    "MUL R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}"
                ),
                ArmModeMultiplyVariant::Mla => write!(
                    f,
                    "MLA R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}, R{rn_accumulate_register}"
                ),
            },
            Self::MultiplyLong {
                variant,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => write!(
                f,
                "{} R{rdlo_destination_register}, R{rdhi_destination_register}, R{rm_operand_register}, R{rs_operand_register}",
                format!("{variant:?}").to_uppercase()
            ),
            Self::PsrTransfer { psr_kind, kind } => match kind {
                PsrOpKind::Mrs {
                    destination_register,
                } => write!(f, "MRS R{destination_register}, {psr_kind}"),
                PsrOpKind::Msr { operand, .. } => write!(f, "MSR {psr_kind}, {operand}"),
            },
            Self::SingleDataSwap { quantity, rn, rd, rm } => {
                let b = if *quantity == ReadWriteKind::Byte { "B" } else { "" };
                write!(f, "SWP{b} R{rd}, R{rm}, [R{rn}]")
            }
            Self::BranchAndExchange { register } => write!(f, "BX R{register}"),
            Self::HalfwordDataTransfer {
                load_store_kind,
                base_register,
                source_destination_register,
                transfer_kind,
                ..
            } => {
                let name = match (load_store_kind, transfer_kind) {
                    (LoadStoreKind::Store, _) => "STRH",
                    (LoadStoreKind::Load, HalfwordTransferKind::UnsignedHalfwords) => "LDRH",
                    (LoadStoreKind::Load, HalfwordTransferKind::SignedByte) => "LDRSB",
                    (LoadStoreKind::Load, HalfwordTransferKind::SignedHalfwords) => "LDRSH",
                };
                write!(f, "{name} R{source_destination_register}, [R{base_register}]")
            }
            Self::SingleDataTransfer {
                kind,
                quantity,
                rd,
                base_register,
                ..
            } => {
                let name = match kind {
                    SingleDataTransferKind::Ldr => "LDR",
                    SingleDataTransferKind::Str => "STR",
                };
                let b = if *quantity == ReadWriteKind::Byte { "B" } else { "" };
                write!(f, "{name}{b} R{rd}, [R{base_register}]")
            }
            Self::BlockDataTransfer {
                load_store,
                rn,
                register_list,
                ..
            } => {
                let name = match load_store {
                    LoadStoreKind::Load => "LDM",
                    LoadStoreKind::Store => "STM",
                };
                write!(f, "{name} R{rn}, {{{register_list:#06X}}}")
            }
            Self::Branch { link, offset } => {
                let l = if *link { "L" } else { "" };
                write!(f, "B{l} {:+}", *offset as i32 + 8)
            }
            Self::SoftwareInterrupt { comment } => write!(f, "SWI #{comment:#X}"),
            Self::Coprocessor => f.write_str("CDP/LDC/STC/MRC/MCR"),
            Self::Undefined => f.write_str("UNDEFINED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::arm::alu_instruction::ShiftOperator;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_mov_immediate() {
        // MOV R0, #0x42
        let instruction = ArmModeInstruction::from(0xE3A0_0042);
        assert_eq!(
            instruction,
            ArmModeInstruction::DataProcessing {
                alu_instruction: ArmModeAluInstruction::Mov,
                set_conditions: false,
                rn: 0,
                destination: 0,
                op2: AluSecondOperandInfo::Immediate {
                    base: 0x42,
                    shift: 0
                },
            }
        );
        assert_eq!(instruction.to_string(), "MOV R0, #66");
    }

    #[test]
    fn decode_add_shifted_register() {
        // ADD R0, R1, R2, LSL #3
        let instruction = ArmModeInstruction::from(0b1110_00_0_0100_0_0001_0000_00011_00_0_0010);
        assert_eq!(
            instruction,
            ArmModeInstruction::DataProcessing {
                alu_instruction: ArmModeAluInstruction::Add,
                set_conditions: false,
                rn: 1,
                destination: 0,
                op2: AluSecondOperandInfo::Register {
                    shift_op: ShiftOperator::Immediate(3),
                    shift_kind: ShiftKind::Lsl,
                    register: 2,
                },
            }
        );
        assert_eq!(instruction.to_string(), "ADD R0, R1, R2, LSL #3");
    }

    #[test]
    fn decode_bx() {
        assert_eq!(
            ArmModeInstruction::from(0xE12F_FF1E),
            ArmModeInstruction::BranchAndExchange { register: 14 }
        );
    }

    #[test]
    fn decode_multiply() {
        // MLA R1, R2, R3, R4
        assert_eq!(
            ArmModeInstruction::from(0xE021_4392),
            ArmModeInstruction::Multiply {
                variant: ArmModeMultiplyVariant::Mla,
                should_set_codes: false,
                rd_destination_register: 1,
                rn_accumulate_register: 4,
                rs_operand_register: 3,
                rm_operand_register: 2,
            }
        );

        // SMULLS R0, R1, R2, R3
        assert_eq!(
            ArmModeInstruction::from(0xE0D1_0392),
            ArmModeInstruction::MultiplyLong {
                variant: ArmModeMultiplyLongVariant::Smull,
                should_set_codes: true,
                rdhi_destination_register: 1,
                rdlo_destination_register: 0,
                rs_operand_register: 3,
                rm_operand_register: 2,
            }
        );
    }

    #[test]
    fn decode_swap() {
        // SWPB R0, R1, [R2]
        assert_eq!(
            ArmModeInstruction::from(0xE142_0091),
            ArmModeInstruction::SingleDataSwap {
                quantity: ReadWriteKind::Byte,
                rn: 2,
                rd: 0,
                rm: 1,
            }
        );
    }

    #[test]
    fn decode_halfword() {
        // LDRH R0, [R1, #0x12]
        assert_eq!(
            ArmModeInstruction::from(0xE1D1_01B2),
            ArmModeInstruction::HalfwordDataTransfer {
                indexing: Indexing::Pre,
                offsetting: Offsetting::Up,
                write_back: false,
                load_store_kind: LoadStoreKind::Load,
                offset_kind: HalfwordDataTransferOffsetKind::Immediate { offset: 0x12 },
                base_register: 1,
                source_destination_register: 0,
                transfer_kind: HalfwordTransferKind::UnsignedHalfwords,
            }
        );

        // LDRSB R3, [R4], -R5
        assert_eq!(
            ArmModeInstruction::from(0xE014_30D5),
            ArmModeInstruction::HalfwordDataTransfer {
                indexing: Indexing::Post,
                offsetting: Offsetting::Down,
                write_back: false,
                load_store_kind: LoadStoreKind::Load,
                offset_kind: HalfwordDataTransferOffsetKind::Register { register: 5 },
                base_register: 4,
                source_destination_register: 3,
                transfer_kind: HalfwordTransferKind::SignedByte,
            }
        );
    }

    #[test]
    fn decode_psr_transfer() {
        // MRS R0, CPSR
        assert_eq!(
            ArmModeInstruction::from(0xE10F_0000),
            ArmModeInstruction::PsrTransfer {
                psr_kind: PsrKind::Cpsr,
                kind: PsrOpKind::Mrs {
                    destination_register: 0
                },
            }
        );

        // MSR CPSR_c, #0xD3
        assert_eq!(
            ArmModeInstruction::from(0xE321_F0D3),
            ArmModeInstruction::PsrTransfer {
                psr_kind: PsrKind::Cpsr,
                kind: PsrOpKind::Msr {
                    field_mask: 0b0001,
                    operand: AluSecondOperandInfo::Immediate {
                        base: 0xD3,
                        shift: 0
                    },
                },
            }
        );

        // MSR SPSR_fc, R1
        assert_eq!(
            ArmModeInstruction::from(0xE169_F001),
            ArmModeInstruction::PsrTransfer {
                psr_kind: PsrKind::Spsr,
                kind: PsrOpKind::Msr {
                    field_mask: 0b1001,
                    operand: AluSecondOperandInfo::Register {
                        shift_op: ShiftOperator::Immediate(0),
                        shift_kind: ShiftKind::Lsl,
                        register: 1,
                    },
                },
            }
        );
    }

    #[test]
    fn decode_single_data_transfer() {
        // LDRB R12, [R12, #768]
        assert_eq!(
            ArmModeInstruction::from(0b1110_01_0_1_1_1_0_1_1100_1100_0011_0000_0000),
            ArmModeInstruction::SingleDataTransfer {
                kind: SingleDataTransferKind::Ldr,
                quantity: ReadWriteKind::Byte,
                write_back: false,
                indexing: Indexing::Pre,
                rd: 12,
                base_register: 12,
                offset_info: SingleDataTransferOffsetInfo::Immediate { offset: 768 },
                offsetting: Offsetting::Up,
            }
        );

        // STR R1, [R2], -R3, ASR #2
        assert_eq!(
            ArmModeInstruction::from(0xE602_1143),
            ArmModeInstruction::SingleDataTransfer {
                kind: SingleDataTransferKind::Str,
                quantity: ReadWriteKind::Word,
                write_back: false,
                indexing: Indexing::Post,
                rd: 1,
                base_register: 2,
                offset_info: SingleDataTransferOffsetInfo::RegisterImmediate {
                    shift_amount: 2,
                    shift_kind: ShiftKind::Asr,
                    reg_offset: 3,
                },
                offsetting: Offsetting::Down,
            }
        );
    }

    #[test]
    fn decode_block_transfer() {
        // STMDB SP!, {R4-R6, LR}
        assert_eq!(
            ArmModeInstruction::from(0xE92D_4070),
            ArmModeInstruction::BlockDataTransfer {
                indexing: Indexing::Pre,
                offsetting: Offsetting::Down,
                load_psr: false,
                write_back: true,
                load_store: LoadStoreKind::Store,
                rn: 13,
                register_list: 0x4070,
            }
        );
    }

    #[test]
    fn decode_branch() {
        // B -8 (branch to self)
        assert_eq!(
            ArmModeInstruction::from(0xEAFF_FFFE),
            ArmModeInstruction::Branch {
                link: false,
                offset: (-8_i32) as u32,
            }
        );
        // BL +0x100
        assert_eq!(
            ArmModeInstruction::from(0xEB00_0040),
            ArmModeInstruction::Branch {
                link: true,
                offset: 0x100,
            }
        );
    }

    #[test]
    fn decode_traps() {
        assert_eq!(
            ArmModeInstruction::from(0xEF00_0011),
            ArmModeInstruction::SoftwareInterrupt { comment: 0x11 }
        );
        // MCR p15, 0, R0, c1, c0, 0
        assert_eq!(
            ArmModeInstruction::from(0xEE01_0F10),
            ArmModeInstruction::Coprocessor
        );
        assert_eq!(
            ArmModeInstruction::from(0xE7F0_00F0),
            ArmModeInstruction::Undefined
        );
    }
}
