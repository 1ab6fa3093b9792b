use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{add, add_with_carry, multiply_cycles, shift, shift_immediate, sub};
use crate::cpu::arm::alu_instruction::{
    AluInstructionKind, AluSecondOperandInfo, ArmModeAluInstruction, Kind, PsrKind, PsrOpKind,
    ShiftOperator,
};
use crate::cpu::arm::instructions::{
    ArmModeInstruction, ArmModeMultiplyLongVariant, ArmModeMultiplyVariant,
    SingleDataTransferKind, SingleDataTransferOffsetInfo,
};
use crate::cpu::arm7tdmi::{Arm7tdmi, Exception};
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    ReadWriteKind,
};
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};

pub const SIZE_OF_INSTRUCTION: u32 = 4;

/// PC read offset for ordinary operands.
const PC_OFFSET: u32 = 8;

/// PC read offset for register-specified shifts and for the stored value of STR/STM.
const PC_OFFSET_LATE: u32 = 12;

impl Arm7tdmi {
    pub(crate) fn dispatch_arm(&mut self, bus: &mut Bus, instruction: ArmModeInstruction) -> u32 {
        use ArmModeInstruction::*;
        match instruction {
            DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => self.data_processing(alu_instruction, set_conditions, rn, destination, op2),
            Multiply {
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            } => self.multiply(
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            ),
            MultiplyLong {
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            } => self.multiply_long(
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            ),
            PsrTransfer { psr_kind, kind } => self.psr_transfer(kind, psr_kind),
            SingleDataSwap {
                quantity,
                rn,
                rd,
                rm,
            } => self.single_data_swap(bus, quantity, rn, rd, rm),
            BranchAndExchange { register } => self.branch_and_exchange(register),
            HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            } => self.half_word_data_transfer(
                bus,
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            ),
            SingleDataTransfer {
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            } => self.single_data_transfer(
                bus,
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            ),
            BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => self.block_data_transfer(
                bus,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
                PC_OFFSET_LATE,
            ),
            Branch { link, offset } => self.branch(link, offset),
            SoftwareInterrupt { comment } => {
                tracing::debug!("SWI 0x{comment:06X}");
                let next = self.registers.program_counter().wrapping_add(SIZE_OF_INSTRUCTION);
                self.enter_exception(Exception::SoftwareInterrupt, next)
            }
            Coprocessor | Undefined => self.undefined_instruction(SIZE_OF_INSTRUCTION),
        }
    }

    /// Raises the Undefined exception with LR pointing past the faulting instruction.
    pub(crate) fn undefined_instruction(&mut self, size: u32) -> u32 {
        let pc = self.registers.program_counter();
        tracing::debug!("undefined instruction at 0x{pc:08X}");
        self.enter_exception(Exception::Undefined, pc.wrapping_add(size))
    }

    /// Value and carry-out of the barrel shifter for operand 2.
    pub fn shifter_operand(&self, op2: AluSecondOperandInfo, pc_offset: u32) -> (u32, bool) {
        let carry = self.cpsr.carry_flag();
        match op2 {
            AluSecondOperandInfo::Immediate { base, shift } => {
                let value = base.rotate_right(shift);
                let carry = if shift == 0 { carry } else { value.get_bit(31) };
                (value, carry)
            }
            AluSecondOperandInfo::Register {
                shift_op,
                shift_kind,
                register,
            } => {
                let rm = self.operand_register(register, pc_offset);
                let r = match shift_op {
                    ShiftOperator::Immediate(amount) => {
                        shift_immediate(shift_kind, amount, rm, carry)
                    }
                    ShiftOperator::Register(rs) => {
                        let amount = self.registers.register_at(rs) & 0xFF;
                        shift(shift_kind, amount, rm, carry)
                    }
                };
                (r.result, r.carry)
            }
        }
    }

    pub fn data_processing(
        &mut self,
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    ) -> u32 {
        let by_register = op2.shifts_by_register();
        let pc_offset = if by_register { PC_OFFSET_LATE } else { PC_OFFSET };

        let op1 = self.operand_register(rn, pc_offset);
        let (op2, shifter_carry) = self.shifter_operand(op2, pc_offset);
        let carry = self.cpsr.carry_flag();

        use ArmModeAluInstruction::*;
        let arithmetic = match alu_instruction {
            Sub | Cmp => Some(sub(op1, op2)),
            Rsb => Some(sub(op2, op1)),
            Add | Cmn => Some(add(op1, op2)),
            Adc => Some(add_with_carry(op1, op2, carry)),
            Sbc => Some(add_with_carry(op1, !op2, carry)),
            Rsc => Some(add_with_carry(op2, !op1, carry)),
            And | Eor | Tst | Teq | Orr | Mov | Bic | Mvn => None,
        };
        let result = match alu_instruction {
            And | Tst => op1 & op2,
            Eor | Teq => op1 ^ op2,
            Orr => op1 | op2,
            Mov => op2,
            Bic => op1 & !op2,
            Mvn => !op2,
            _ => arithmetic.map_or(0, |r| r.result),
        };

        let mut cycles = 1 + u32::from(by_register);

        if alu_instruction.writes_result() && destination == REG_PROGRAM_COUNTER {
            // S with Rd = PC is the exception return form.
            if set_conditions {
                match self.spsr() {
                    Some(spsr) => self.write_cpsr(spsr),
                    None => tracing::debug!("{alu_instruction}S PC without an SPSR in {:?}", self.cpsr.mode()),
                }
            }
            self.write_register(REG_PROGRAM_COUNTER, result);
            cycles += 2;
            return cycles;
        }

        if set_conditions {
            match (alu_instruction.kind(), arithmetic) {
                (AluInstructionKind::Arithmetic, Some(r)) => self.cpsr.set_flags(&r),
                _ => {
                    self.cpsr.set_sign_zero(result);
                    self.cpsr.set_carry_flag(shifter_carry);
                }
            }
        }

        if alu_instruction.writes_result() {
            self.write_register(destination, result);
        }

        cycles
    }

    pub fn psr_transfer(&mut self, op_kind: PsrOpKind, psr_kind: PsrKind) -> u32 {
        match op_kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let psr = match psr_kind {
                    PsrKind::Cpsr => self.cpsr,
                    PsrKind::Spsr => self.spsr().unwrap_or(self.cpsr),
                };
                self.write_register(destination_register, psr.into());
            }
            PsrOpKind::Msr {
                field_mask,
                operand,
            } => {
                let value = match operand {
                    AluSecondOperandInfo::Immediate { base, shift } => base.rotate_right(shift),
                    AluSecondOperandInfo::Register { register, .. } => {
                        self.registers.register_at(register)
                    }
                };
                let mut mask = Psr::field_mask(field_mask);

                match psr_kind {
                    PsrKind::Cpsr => {
                        if !self.cpsr.mode().is_privileged() {
                            mask &= 0xFF00_0000;
                        }
                        // T is only changed through BX and exception entry/return.
                        mask.set_bit_off(5);
                        let current = u32::from(self.cpsr);
                        self.write_cpsr(Psr::from((current & !mask) | (value & mask)));
                    }
                    PsrKind::Spsr => match self.spsr() {
                        Some(spsr) => {
                            let current = u32::from(spsr);
                            self.set_spsr(Psr::from((current & !mask) | (value & mask)));
                        }
                        None => tracing::debug!("MSR SPSR ignored in {:?}", self.cpsr.mode()),
                    },
                }
            }
        }
        1
    }

    pub fn branch_and_exchange(&mut self, register: usize) -> u32 {
        let target = self.operand_register(register, PC_OFFSET);
        self.cpsr.set_cpu_state(target.get_bit(0).into());
        self.write_register(REG_PROGRAM_COUNTER, target);
        3
    }

    pub fn branch(&mut self, is_link: bool, offset: u32) -> u32 {
        let pc = self.registers.program_counter();
        if is_link {
            self.registers
                .set_register_at(REG_LR, pc.wrapping_add(SIZE_OF_INSTRUCTION));
        }
        self.write_register(
            REG_PROGRAM_COUNTER,
            pc.wrapping_add(PC_OFFSET).wrapping_add(offset),
        );
        3
    }

    pub fn multiply(
        &mut self,
        variant: ArmModeMultiplyVariant,
        should_set_codes: bool,
        rd_destination_register: usize,
        rn_accumulate_register: usize,
        rs_operand_register: usize,
        rm_operand_register: usize,
    ) -> u32 {
        let rm = self.registers.register_at(rm_operand_register);
        let rs = self.registers.register_at(rs_operand_register);

        let mut result = rm.wrapping_mul(rs);
        let mut cycles = 1 + multiply_cycles(rs, true);
        if variant == ArmModeMultiplyVariant::Mla {
            result = result.wrapping_add(self.registers.register_at(rn_accumulate_register));
            cycles += 1;
        }

        self.write_register(rd_destination_register, result);
        if should_set_codes {
            self.cpsr.set_sign_zero(result);
        }

        cycles
    }

    pub fn multiply_long(
        &mut self,
        variant: ArmModeMultiplyLongVariant,
        should_set_codes: bool,
        rdhi_destination_register: usize,
        rdlo_destination_register: usize,
        rs_operand_register: usize,
        rm_operand_register: usize,
    ) -> u32 {
        let rm = self.registers.register_at(rm_operand_register);
        let rs = self.registers.register_at(rs_operand_register);
        let signed = variant.is_signed();

        let mut result = if signed {
            (i64::from(rm as i32) * i64::from(rs as i32)) as u64
        } else {
            u64::from(rm) * u64::from(rs)
        };

        let mut cycles = 2 + multiply_cycles(rs, signed);
        if variant.accumulates() {
            let hi = u64::from(self.registers.register_at(rdhi_destination_register));
            let lo = u64::from(self.registers.register_at(rdlo_destination_register));
            result = result.wrapping_add((hi << 32) | lo);
            cycles += 1;
        }

        self.write_register(rdlo_destination_register, result as u32);
        self.write_register(rdhi_destination_register, (result >> 32) as u32);
        if should_set_codes {
            self.cpsr.set_sign_flag(result.get_bit(63));
            self.cpsr.set_zero_flag(result == 0);
        }

        cycles
    }

    pub fn single_data_swap(
        &mut self,
        bus: &mut Bus,
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    ) -> u32 {
        let address = self.registers.register_at(rn);
        let source = self.registers.register_at(rm);

        let loaded = match quantity {
            ReadWriteKind::Byte => {
                let value = u32::from(bus.read_byte(address));
                bus.write_byte(address, source as u8);
                value
            }
            ReadWriteKind::Word => {
                let value = Self::load_word(bus, address);
                bus.write_word(address, source);
                value
            }
        };
        self.write_register(rd, loaded);

        4
    }

    pub(crate) fn single_data_transfer(
        &mut self,
        bus: &mut Bus,
        kind: SingleDataTransferKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: usize,
        base_register: usize,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    ) -> u32 {
        let offset = match offset_info {
            SingleDataTransferOffsetInfo::Immediate { offset } => offset,
            SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => {
                let rm = self.registers.register_at(reg_offset);
                shift_immediate(shift_kind, shift_amount, rm, self.cpsr.carry_flag()).result
            }
        };

        let base = self.operand_register(base_register, PC_OFFSET);
        let effective = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => effective,
            Indexing::Post => base,
        };
        let writes_back = (indexing == Indexing::Post || write_back)
            && base_register != REG_PROGRAM_COUNTER;

        match kind {
            SingleDataTransferKind::Str => {
                let value = self.operand_register(rd, PC_OFFSET_LATE);
                match quantity {
                    ReadWriteKind::Byte => bus.write_byte(address, value as u8),
                    ReadWriteKind::Word => bus.write_word(address, value),
                }
                if writes_back {
                    self.registers.set_register_at(base_register, effective);
                }
                2
            }
            SingleDataTransferKind::Ldr => {
                let value = match quantity {
                    ReadWriteKind::Byte => u32::from(bus.read_byte(address)),
                    ReadWriteKind::Word => Self::load_word(bus, address),
                };
                if writes_back {
                    self.registers.set_register_at(base_register, effective);
                }
                self.write_register(rd, value);
                if rd == REG_PROGRAM_COUNTER { 5 } else { 3 }
            }
        }
    }

    pub fn half_word_data_transfer(
        &mut self,
        bus: &mut Bus,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: usize,
        source_destination_register: usize,
        transfer_kind: HalfwordTransferKind,
    ) -> u32 {
        if load_store_kind == LoadStoreKind::Store
            && transfer_kind != HalfwordTransferKind::UnsignedHalfwords
        {
            return self.undefined_instruction(SIZE_OF_INSTRUCTION);
        }

        let offset = match offset_kind {
            HalfwordDataTransferOffsetKind::Immediate { offset } => offset,
            HalfwordDataTransferOffsetKind::Register { register } => {
                self.registers.register_at(register as usize)
            }
        };

        let base = self.operand_register(base_register, PC_OFFSET);
        let effective = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => effective,
            Indexing::Post => base,
        };
        let writes_back = (indexing == Indexing::Post || write_back)
            && base_register != REG_PROGRAM_COUNTER;

        match load_store_kind {
            LoadStoreKind::Store => {
                let value = self.operand_register(source_destination_register, PC_OFFSET_LATE);
                bus.write_half_word(address, value as u16);
                if writes_back {
                    self.registers.set_register_at(base_register, effective);
                }
                2
            }
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => Self::load_half_word(bus, address),
                    HalfwordTransferKind::SignedByte => Self::load_signed_byte(bus, address),
                    HalfwordTransferKind::SignedHalfwords => {
                        Self::load_signed_half_word(bus, address)
                    }
                };
                if writes_back {
                    self.registers.set_register_at(base_register, effective);
                }
                self.write_register(source_destination_register, value);
                if source_destination_register == REG_PROGRAM_COUNTER { 5 } else { 3 }
            }
        }
    }

    pub(crate) fn block_data_transfer(
        &mut self,
        bus: &mut Bus,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: usize,
        register_list: u16,
        pc_store_offset: u32,
    ) -> u32 {
        // An empty list transfers R15 and moves the base by 0x40.
        // A stored R15 reads as the instruction address plus `pc_store_offset`.
        let (reg_list, transfer_size) = if register_list == 0 {
            (1_u16 << 15, 0x40)
        } else {
            (register_list, register_list.count_ones() * 4)
        };
        let count = reg_list.count_ones();

        let base = self.registers.register_at(rn);
        let (start, new_base) = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Post) => (base, base.wrapping_add(transfer_size)),
            (Offsetting::Up, Indexing::Pre) => (base.wrapping_add(4), base.wrapping_add(transfer_size)),
            (Offsetting::Down, Indexing::Post) => (
                base.wrapping_sub(transfer_size).wrapping_add(4),
                base.wrapping_sub(transfer_size),
            ),
            (Offsetting::Down, Indexing::Pre) => (
                base.wrapping_sub(transfer_size),
                base.wrapping_sub(transfer_size),
            ),
        };

        let loads_pc = load_store == LoadStoreKind::Load && reg_list.is_bit_on(15);
        let user_bank = load_psr && !loads_pc;
        let writes_back = write_back && rn != REG_PROGRAM_COUNTER;
        let registers = (0..16_u8).filter(|reg| reg_list.is_bit_on(*reg)).map(usize::from);

        match load_store {
            LoadStoreKind::Store => {
                let lowest = reg_list.trailing_zeros() as usize;
                for (idx, reg) in registers.enumerate() {
                    let value = if reg == rn && writes_back && reg != lowest {
                        new_base
                    } else if reg == REG_PROGRAM_COUNTER {
                        self.operand_register(reg, pc_store_offset)
                    } else if user_bank {
                        self.user_register_at(reg)
                    } else {
                        self.registers.register_at(reg)
                    };
                    bus.write_word(start.wrapping_add(idx as u32 * 4), value);
                }
                if writes_back {
                    self.registers.set_register_at(rn, new_base);
                }
                count + 1
            }
            LoadStoreKind::Load => {
                if writes_back {
                    self.registers.set_register_at(rn, new_base);
                }

                let mut new_pc = None;
                for (idx, reg) in registers.enumerate() {
                    let value = bus.read_word(start.wrapping_add(idx as u32 * 4));
                    if reg == REG_PROGRAM_COUNTER {
                        new_pc = Some(value);
                    } else if user_bank {
                        self.set_user_register_at(reg, value);
                    } else {
                        self.registers.set_register_at(reg, value);
                    }
                }

                match new_pc {
                    Some(pc) => {
                        if load_psr {
                            match self.spsr() {
                                Some(spsr) => self.write_cpsr(spsr),
                                None => tracing::debug!("LDM ^ without an SPSR"),
                            }
                        }
                        self.write_register(REG_PROGRAM_COUNTER, pc);
                        count + 4
                    }
                    None => count + 2,
                }
            }
        }
    }

    /// Entry point for the Thumb BX/hi-register forms, which share the ARM state switch.
    pub(crate) fn exchange_to(&mut self, target: u32) {
        let state: CpuState = target.get_bit(0).into();
        self.cpsr.set_cpu_state(state);
        self.write_register(REG_PROGRAM_COUNTER, target);
    }
}
