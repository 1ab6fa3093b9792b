use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{add, add_with_carry, multiply_cycles, shift, shift_immediate, sub};
use crate::cpu::arm7tdmi::{Arm7tdmi, Exception};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{Indexing, LoadStoreKind, OperandKind, Operation, Offsetting, ReadWriteKind, ShiftKind};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::thumb::alu_instructions::{ThumbHighRegisterOperation, ThumbModeAluInstruction};
use crate::cpu::thumb::instruction::ThumbModeInstruction;

pub const SIZE_OF_INSTRUCTION: u32 = 2;

/// R15 as seen by a Thumb operand.
const PC_OFFSET: u32 = 4;

/// R15 as stored by a block transfer with an empty register list.
const PC_STORE_OFFSET: u32 = 6;

impl Arm7tdmi {
    pub(crate) fn dispatch_thumb(&mut self, bus: &mut Bus, instruction: ThumbModeInstruction) -> u32 {
        use ThumbModeInstruction::*;
        match instruction {
            MoveShiftedRegister {
                shift_operation,
                offset5,
                source_register,
                destination_register,
            } => self.move_shifted_reg(shift_operation, offset5, source_register, destination_register),
            AddSubtract {
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            } => self.add_subtract(
                operation_kind,
                subtract,
                rn_offset3,
                source_register,
                destination_register,
            ),
            MoveCompareAddSubtractImm {
                operation,
                destination_register,
                offset,
            } => self.move_compare_add_sub_imm(operation, destination_register, offset),
            AluOp {
                alu_operation,
                source_register,
                destination_register,
            } => self.alu_op(alu_operation, source_register, destination_register),
            HiRegisterOpBX {
                register_operation,
                source_register,
                destination_register,
            } => self.hi_register_operation(register_operation, source_register, destination_register),
            PCRelativeLoad {
                destination_register,
                immediate_value,
            } => self.pc_relative_load(bus, destination_register, immediate_value),
            LoadStoreRegisterOffset {
                load_store,
                byte_word,
                ro,
                base_register,
                destination_register,
            } => {
                let address = self
                    .registers
                    .register_at(base_register)
                    .wrapping_add(self.registers.register_at(ro));
                self.load_store(bus, load_store, byte_word, address, destination_register)
            }
            LoadStoreSignExtByteHalfword {
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            } => self.load_store_sign_extend(
                bus,
                h,
                sign_extend_flag,
                offset_register,
                base_register,
                destination_register,
            ),
            LoadStoreImmOffset {
                load_store,
                byte_word,
                offset,
                base_register,
                destination_register,
            } => {
                let address = self.registers.register_at(base_register).wrapping_add(offset);
                self.load_store(bus, load_store, byte_word, address, destination_register)
            }
            LoadStoreHalfword {
                load_store,
                offset,
                base_register,
                source_destination_register,
            } => {
                let address = self.registers.register_at(base_register).wrapping_add(offset);
                match load_store {
                    LoadStoreKind::Store => {
                        let value = self.registers.register_at(source_destination_register);
                        bus.write_half_word(address, value as u16);
                        2
                    }
                    LoadStoreKind::Load => {
                        let value = Self::load_half_word(bus, address);
                        self.registers.set_register_at(source_destination_register, value);
                        3
                    }
                }
            }
            SPRelativeLoadStore {
                load_store,
                destination_register,
                word8,
            } => {
                let address = self.registers.register_at(REG_SP).wrapping_add(word8);
                self.load_store(bus, load_store, ReadWriteKind::Word, address, destination_register)
            }
            LoadAddress {
                sp,
                destination_register,
                offset,
            } => {
                let base = if sp {
                    self.registers.register_at(REG_SP)
                } else {
                    self.operand_register(REG_PROGRAM_COUNTER, PC_OFFSET) & !3
                };
                self.registers
                    .set_register_at(destination_register, base.wrapping_add(offset));
                1
            }
            AddOffsetSP { negative, word7 } => {
                let sp = self.registers.register_at(REG_SP);
                let sp = if negative {
                    sp.wrapping_sub(word7)
                } else {
                    sp.wrapping_add(word7)
                };
                self.registers.set_register_at(REG_SP, sp);
                1
            }
            PushPopReg {
                load_store,
                pc_lr,
                register_list,
            } => self.push_pop(bus, load_store, pc_lr, register_list),
            MultipleLoadStore {
                load_store,
                base_register,
                register_list,
            } => self.block_data_transfer(
                bus,
                Indexing::Post,
                Offsetting::Up,
                false,
                true,
                load_store,
                base_register,
                register_list,
                PC_STORE_OFFSET,
            ),
            CondBranch {
                condition,
                immediate_offset,
            } => self.cond_branch(condition, immediate_offset),
            Swi { comment } => {
                tracing::debug!("SWI 0x{comment:02X} (Thumb)");
                let next = self.registers.program_counter().wrapping_add(SIZE_OF_INSTRUCTION);
                self.enter_exception(Exception::SoftwareInterrupt, next)
            }
            UncondBranch { offset } => {
                let target = self
                    .operand_register(REG_PROGRAM_COUNTER, PC_OFFSET)
                    .wrapping_add(offset);
                self.write_register(REG_PROGRAM_COUNTER, target);
                3
            }
            LongBranchLink { h, offset } => self.long_branch_link(h, offset),
            Undefined => self.undefined_instruction(SIZE_OF_INSTRUCTION),
        }
    }

    pub fn move_shifted_reg(&mut self, op: ShiftKind, offset5: u32, rs: usize, rd: usize) -> u32 {
        let source = self.registers.register_at(rs);
        let r = shift_immediate(op, offset5, source, self.cpsr.carry_flag());
        self.registers.set_register_at(rd, r.result);

        self.cpsr.set_carry_flag(r.carry);
        self.cpsr.set_sign_zero(r.result);
        1
    }

    pub fn add_subtract(
        &mut self,
        operation_kind: OperandKind,
        subtract: bool,
        rn_offset3: u32,
        rs: usize,
        rd: usize,
    ) -> u32 {
        let rs = self.registers.register_at(rs);
        let offset = match operation_kind {
            OperandKind::Immediate => rn_offset3,
            OperandKind::Register => self.registers.register_at(rn_offset3 as usize),
        };

        let r = if subtract { sub(rs, offset) } else { add(rs, offset) };
        self.registers.set_register_at(rd, r.result);
        self.cpsr.set_flags(&r);
        1
    }

    pub fn move_compare_add_sub_imm(&mut self, op: Operation, rd: usize, offset: u32) -> u32 {
        let rd_value = self.registers.register_at(rd);
        match op {
            Operation::Mov => {
                self.registers.set_register_at(rd, offset);
                self.cpsr.set_sign_zero(offset);
            }
            Operation::Cmp => self.cpsr.set_flags(&sub(rd_value, offset)),
            Operation::Add => {
                let r = add(rd_value, offset);
                self.registers.set_register_at(rd, r.result);
                self.cpsr.set_flags(&r);
            }
            Operation::Sub => {
                let r = sub(rd_value, offset);
                self.registers.set_register_at(rd, r.result);
                self.cpsr.set_flags(&r);
            }
        }
        1
    }

    pub fn alu_op(&mut self, op: ThumbModeAluInstruction, rs: usize, rd: usize) -> u32 {
        use ThumbModeAluInstruction::*;

        let rs_value = self.registers.register_at(rs);
        let rd_value = self.registers.register_at(rd);
        let carry = self.cpsr.carry_flag();

        let (result, writes) = match op {
            And | Eor | Orr | Bic | Mvn | Tst => {
                let result = match op {
                    And | Tst => rd_value & rs_value,
                    Eor => rd_value ^ rs_value,
                    Orr => rd_value | rs_value,
                    Bic => rd_value & !rs_value,
                    _ => !rs_value,
                };
                self.cpsr.set_sign_zero(result);
                (result, op != Tst)
            }
            Lsl | Lsr | Asr | Ror => {
                let kind = match op {
                    Lsl => ShiftKind::Lsl,
                    Lsr => ShiftKind::Lsr,
                    Asr => ShiftKind::Asr,
                    _ => ShiftKind::Ror,
                };
                let r = shift(kind, rs_value & 0xFF, rd_value, carry);
                self.cpsr.set_carry_flag(r.carry);
                self.cpsr.set_sign_zero(r.result);
                (r.result, true)
            }
            Adc | Sbc | Neg | Cmp | Cmn => {
                let r = match op {
                    Adc => add_with_carry(rd_value, rs_value, carry),
                    Sbc => add_with_carry(rd_value, !rs_value, carry),
                    Neg => sub(0, rs_value),
                    Cmp => sub(rd_value, rs_value),
                    _ => add(rd_value, rs_value),
                };
                self.cpsr.set_flags(&r);
                (r.result, !matches!(op, Cmp | Cmn))
            }
            Mul => {
                let result = rd_value.wrapping_mul(rs_value);
                self.cpsr.set_sign_zero(result);
                (result, true)
            }
        };

        if writes {
            self.registers.set_register_at(rd, result);
        }

        match op {
            Mul => 1 + multiply_cycles(rd_value, true),
            op if op.is_shift() => 2,
            _ => 1,
        }
    }

    pub fn hi_register_operation(
        &mut self,
        op: ThumbHighRegisterOperation,
        rs: usize,
        rd: usize,
    ) -> u32 {
        let source = self.operand_register(rs, PC_OFFSET);
        match op {
            ThumbHighRegisterOperation::Add => {
                let result = self.operand_register(rd, PC_OFFSET).wrapping_add(source);
                self.write_register(rd, result);
            }
            ThumbHighRegisterOperation::Cmp => {
                let r = sub(self.operand_register(rd, PC_OFFSET), source);
                self.cpsr.set_flags(&r);
                return 1;
            }
            ThumbHighRegisterOperation::Mov => self.write_register(rd, source),
            ThumbHighRegisterOperation::Bx => {
                self.exchange_to(source);
                return 3;
            }
        }

        if rd == REG_PROGRAM_COUNTER { 3 } else { 1 }
    }

    pub fn pc_relative_load(&mut self, bus: &mut Bus, rd: usize, offset: u32) -> u32 {
        let base = self.operand_register(REG_PROGRAM_COUNTER, PC_OFFSET) & !3;
        let value = bus.read_word(base.wrapping_add(offset));
        self.registers.set_register_at(rd, value);
        3
    }

    fn load_store(
        &mut self,
        bus: &mut Bus,
        load_store: LoadStoreKind,
        byte_word: ReadWriteKind,
        address: u32,
        rd: usize,
    ) -> u32 {
        match (load_store, byte_word) {
            (LoadStoreKind::Store, ReadWriteKind::Word) => {
                bus.write_word(address, self.registers.register_at(rd));
                2
            }
            (LoadStoreKind::Store, ReadWriteKind::Byte) => {
                bus.write_byte(address, self.registers.register_at(rd) as u8);
                2
            }
            (LoadStoreKind::Load, ReadWriteKind::Word) => {
                let value = Self::load_word(bus, address);
                self.registers.set_register_at(rd, value);
                3
            }
            (LoadStoreKind::Load, ReadWriteKind::Byte) => {
                let value = u32::from(bus.read_byte(address));
                self.registers.set_register_at(rd, value);
                3
            }
        }
    }

    fn load_store_sign_extend(
        &mut self,
        bus: &mut Bus,
        h: bool,
        sign_extend: bool,
        ro: usize,
        rb: usize,
        rd: usize,
    ) -> u32 {
        let address = self
            .registers
            .register_at(rb)
            .wrapping_add(self.registers.register_at(ro));

        let value = match (sign_extend, h) {
            (false, false) => {
                bus.write_half_word(address, self.registers.register_at(rd) as u16);
                return 2;
            }
            (false, true) => Self::load_half_word(bus, address),
            (true, false) => Self::load_signed_byte(bus, address),
            (true, true) => Self::load_signed_half_word(bus, address),
        };
        self.registers.set_register_at(rd, value);
        3
    }

    /// PUSH is `STMDB SP!` with LR appended, POP is `LDMIA SP!` with PC appended.
    pub fn push_pop(
        &mut self,
        bus: &mut Bus,
        load_store: LoadStoreKind,
        pc_lr: bool,
        register_list: u16,
    ) -> u32 {
        let (indexing, offsetting, extra) = match load_store {
            LoadStoreKind::Store => (Indexing::Pre, Offsetting::Down, REG_LR),
            LoadStoreKind::Load => (Indexing::Post, Offsetting::Up, REG_PROGRAM_COUNTER),
        };
        let mut list = register_list;
        if pc_lr {
            list.set_bit_on(extra as u8);
        }

        self.block_data_transfer(
            bus,
            indexing,
            offsetting,
            false,
            true,
            load_store,
            REG_SP,
            list,
            PC_STORE_OFFSET,
        )
    }

    pub fn cond_branch(&mut self, condition: Condition, offset: u32) -> u32 {
        if !self.cpsr.can_execute(condition) {
            return 1;
        }
        let target = self
            .operand_register(REG_PROGRAM_COUNTER, PC_OFFSET)
            .wrapping_add(offset);
        self.write_register(REG_PROGRAM_COUNTER, target);
        3
    }

    /// First half parks the upper offset in LR, second half branches and links.
    pub fn long_branch_link(&mut self, h: bool, offset: u32) -> u32 {
        let pc = self.registers.program_counter();
        if h {
            let target = self
                .registers
                .register_at(REG_LR)
                .wrapping_add(offset << 1);
            self.registers
                .set_register_at(REG_LR, pc.wrapping_add(SIZE_OF_INSTRUCTION) | 1);
            self.write_register(REG_PROGRAM_COUNTER, target);
            3
        } else {
            let upper = offset.sign_extended(11) << 12;
            self.registers
                .set_register_at(REG_LR, pc.wrapping_add(PC_OFFSET).wrapping_add(upper));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::psr::CpuState;
    use crate::cpu::thumb::mode::ThumbModeOpcode;
    use pretty_assertions::assert_eq;

    const RAM: u32 = 0x1000_0000;

    fn thumb_cpu() -> Arm7tdmi {
        let mut cpu = Arm7tdmi::default();
        cpu.reset(RAM);
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu
    }

    fn run(cpu: &mut Arm7tdmi, bus: &mut Bus, op_code: u16) -> u32 {
        let op_code: ThumbModeOpcode = ThumbModeOpcode::from(op_code);
        cpu.execute_thumb(bus, op_code)
    }

    #[test]
    fn check_move_shifted_register() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(2, 0x8000_0001);
        // LSL R1, R2, #1
        assert_eq!(run(&mut cpu, &mut bus, 0x0051), 1);
        assert_eq!(cpu.registers.register_at(1), 2);
        assert!(cpu.cpsr.carry_flag());

        // LSR R1, R2, #0 means #32
        run(&mut cpu, &mut bus, 0x0811);
        assert_eq!(cpu.registers.register_at(1), 0);
        assert!(cpu.cpsr.carry_flag());
        assert!(cpu.cpsr.zero_flag());
    }

    #[test]
    fn check_add_subtract() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(1, 1);
        // SUB R0, R1, #2
        assert_eq!(run(&mut cpu, &mut bus, 0x1E88), 1);
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_FFFF);
        assert!(cpu.cpsr.sign_flag());
        assert!(!cpu.cpsr.carry_flag());

        cpu.registers.set_register_at(2, 0xFFFF_FFFF);
        // ADD R0, R1, R2
        run(&mut cpu, &mut bus, 0x1888);
        assert_eq!(cpu.registers.register_at(0), 0);
        assert!(cpu.cpsr.zero_flag());
        assert!(cpu.cpsr.carry_flag());
    }

    #[test]
    fn check_immediate_ops() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.cpsr.set_carry_flag(true);
        // MOV R3, #0xFF
        run(&mut cpu, &mut bus, 0x23FF);
        assert_eq!(cpu.registers.register_at(3), 0xFF);
        assert!(cpu.cpsr.carry_flag());

        // ADD R3, #1
        run(&mut cpu, &mut bus, 0x3301);
        assert_eq!(cpu.registers.register_at(3), 0x100);

        // CMP R3, #0xFF
        run(&mut cpu, &mut bus, 0x2BFF);
        assert!(!cpu.cpsr.zero_flag());
        assert!(cpu.cpsr.carry_flag());

        // SUB R3, #0xFF
        run(&mut cpu, &mut bus, 0x3BFF);
        assert_eq!(cpu.registers.register_at(3), 1);
    }

    #[test]
    fn check_alu_ops() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(0, 0b1100);
        cpu.registers.set_register_at(1, 0b1010);

        // AND R0, R1
        assert_eq!(run(&mut cpu, &mut bus, 0x4008), 1);
        assert_eq!(cpu.registers.register_at(0), 0b1000);

        // NEG R0, R1
        run(&mut cpu, &mut bus, 0x4248);
        assert_eq!(cpu.registers.register_at(0), (-10_i32) as u32);

        // MVN R0, R1
        run(&mut cpu, &mut bus, 0x43C8);
        assert_eq!(cpu.registers.register_at(0), !0b1010);

        // MUL R0, R1
        cpu.registers.set_register_at(0, 3);
        assert_eq!(run(&mut cpu, &mut bus, 0x4348), 2);
        assert_eq!(cpu.registers.register_at(0), 30);
    }

    #[test]
    fn check_register_shift_costs_two() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(0, 1);
        cpu.registers.set_register_at(1, 4);
        // LSL R0, R1
        assert_eq!(run(&mut cpu, &mut bus, 0x4088), 2);
        assert_eq!(cpu.registers.register_at(0), 16);

        // ROR R0, R1
        assert_eq!(run(&mut cpu, &mut bus, 0x41C8), 2);
        assert_eq!(cpu.registers.register_at(0), 1);
    }

    #[test]
    fn check_hi_register_ops() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(0, 0x1234);
        // MOV R8, R0
        assert_eq!(run(&mut cpu, &mut bus, 0x4680), 1);
        assert_eq!(cpu.registers.register_at(8), 0x1234);

        // ADD R0, R8
        run(&mut cpu, &mut bus, 0x4440);
        assert_eq!(cpu.registers.register_at(0), 0x2468);

        // MOV PC, R8 stays in Thumb
        assert_eq!(run(&mut cpu, &mut bus, 0x46C7), 3);
        assert_eq!(cpu.registers.program_counter(), 0x1234);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_bx_to_arm() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(REG_LR, RAM + 0x102);
        // BX LR
        assert_eq!(run(&mut cpu, &mut bus, 0x4770), 3);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.program_counter(), RAM + 0x100);
    }

    #[test]
    fn check_pc_relative_load() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_program_counter(RAM + 2);
        bus.write_word(RAM + 4 + 8, 0xDEAD_BEEF);
        // LDR R0, [PC, #8]
        assert_eq!(run(&mut cpu, &mut bus, 0x4802), 3);
        assert_eq!(cpu.registers.register_at(0), 0xDEAD_BEEF);
    }

    #[test]
    fn check_load_store_forms() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(1, 0xFFFF_8080);
        cpu.registers.set_register_at(2, RAM + 0x100);
        // STR R1, [R2, #4]
        assert_eq!(run(&mut cpu, &mut bus, 0x6051), 2);
        assert_eq!(bus.read_word(RAM + 0x104), 0xFFFF_8080);

        // LDRB R0, [R2, #4]
        assert_eq!(run(&mut cpu, &mut bus, 0x7910), 3);
        assert_eq!(cpu.registers.register_at(0), 0x80);

        // LDRH R0, [R2, #4]
        run(&mut cpu, &mut bus, 0x8890);
        assert_eq!(cpu.registers.register_at(0), 0x8080);

        cpu.registers.set_register_at(3, 4);
        // LDSB R0, [R2, R3]
        run(&mut cpu, &mut bus, 0x56D0);
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_FF80);

        // LDSH R0, [R2, R3]
        run(&mut cpu, &mut bus, 0x5ED0);
        assert_eq!(cpu.registers.register_at(0), 0xFFFF_8080);

        // STRH R3, [R2, R3]
        run(&mut cpu, &mut bus, 0x52D3);
        assert_eq!(bus.read_word(RAM + 0x104), 0xFFFF_0004);
    }

    #[test]
    fn check_sp_relative_and_load_address() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(REG_SP, RAM + 0x800);
        cpu.registers.set_register_at(0, 77);
        // STR R0, [SP, #8]
        run(&mut cpu, &mut bus, 0x9002);
        assert_eq!(bus.read_word(RAM + 0x808), 77);

        // LDR R1, [SP, #8]
        run(&mut cpu, &mut bus, 0x9902);
        assert_eq!(cpu.registers.register_at(1), 77);

        // ADD R2, SP, #16
        run(&mut cpu, &mut bus, 0xAA04);
        assert_eq!(cpu.registers.register_at(2), RAM + 0x810);

        // ADD R2, PC, #16
        cpu.registers.set_program_counter(RAM + 2);
        run(&mut cpu, &mut bus, 0xA204);
        assert_eq!(cpu.registers.register_at(2), RAM + 4 + 16);

        // ADD SP, #-16
        run(&mut cpu, &mut bus, 0xB084);
        assert_eq!(cpu.registers.register_at(REG_SP), RAM + 0x7F0);
    }

    #[test]
    fn check_push_pop() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(REG_SP, RAM + 0x800);
        cpu.registers.set_register_at(4, 0x44);
        cpu.registers.set_register_at(5, 0x55);
        cpu.registers.set_register_at(REG_LR, RAM + 0x201);

        // PUSH {R4, R5, LR}
        assert_eq!(run(&mut cpu, &mut bus, 0xB530), 4);
        assert_eq!(cpu.registers.register_at(REG_SP), RAM + 0x800 - 12);
        assert_eq!(bus.read_word(RAM + 0x800 - 12), 0x44);
        assert_eq!(bus.read_word(RAM + 0x800 - 4), RAM + 0x201);

        cpu.registers.set_register_at(4, 0);
        // POP {R4, R5, PC}
        assert_eq!(run(&mut cpu, &mut bus, 0xBD30), 7);
        assert_eq!(cpu.registers.register_at(4), 0x44);
        assert_eq!(cpu.registers.register_at(REG_SP), RAM + 0x800);
        // No interworking on ARMv4T
        assert_eq!(cpu.registers.program_counter(), RAM + 0x200);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn check_empty_list_stores_pc_plus_six() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(0, RAM + 0x300);
        // STMIA R0!, {}
        run(&mut cpu, &mut bus, 0xC000);
        assert_eq!(bus.read_word(RAM + 0x300), RAM + 6);
        assert_eq!(cpu.registers.register_at(0), RAM + 0x340);

        let mut cpu = thumb_cpu();
        cpu.registers.set_register_at(REG_SP, RAM + 0x800);
        // PUSH {}
        run(&mut cpu, &mut bus, 0xB400);
        assert_eq!(cpu.registers.register_at(REG_SP), RAM + 0x7C0);
        assert_eq!(bus.read_word(RAM + 0x7C0), RAM + 6);
    }

    #[test]
    fn check_ldmia_stmia() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        cpu.registers.set_register_at(0, RAM + 0x300);
        cpu.registers.set_register_at(1, 11);
        cpu.registers.set_register_at(2, 22);
        // STMIA R0!, {R1, R2}
        assert_eq!(run(&mut cpu, &mut bus, 0xC006), 3);
        assert_eq!(cpu.registers.register_at(0), RAM + 0x308);
        assert_eq!(bus.read_word(RAM + 0x304), 22);

        cpu.registers.set_register_at(3, RAM + 0x300);
        // LDMIA R3!, {R4, R5}
        assert_eq!(run(&mut cpu, &mut bus, 0xCB30), 4);
        assert_eq!(cpu.registers.register_at(4), 11);
        assert_eq!(cpu.registers.register_at(5), 22);
        assert_eq!(cpu.registers.register_at(3), RAM + 0x308);
    }

    #[test]
    fn check_branches() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        // BEQ -4, not taken
        assert_eq!(run(&mut cpu, &mut bus, 0xD0FE), 1);
        assert_eq!(cpu.registers.program_counter(), RAM);

        cpu.cpsr.set_zero_flag(true);
        assert_eq!(run(&mut cpu, &mut bus, 0xD0FE), 3);
        assert_eq!(cpu.registers.program_counter(), RAM);

        // B +8
        assert_eq!(run(&mut cpu, &mut bus, 0xE004), 3);
        assert_eq!(cpu.registers.program_counter(), RAM + 4 + 8);
    }

    #[test]
    fn check_long_branch_link() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        // BL +0x1000: hi = 1, lo = 0
        assert_eq!(run(&mut cpu, &mut bus, 0xF001), 1);
        assert_eq!(cpu.registers.register_at(REG_LR), RAM + 4 + 0x1000);

        cpu.registers.set_program_counter(RAM + 2);
        assert_eq!(run(&mut cpu, &mut bus, 0xF800), 3);
        assert_eq!(cpu.registers.program_counter(), RAM + 4 + 0x1000);
        assert_eq!(cpu.registers.register_at(REG_LR), (RAM + 4) | 1);
    }

    #[test]
    fn check_swi_and_undefined_from_thumb() {
        let mut cpu = thumb_cpu();
        let mut bus = Bus::default();
        // SWI 0x2A
        assert_eq!(run(&mut cpu, &mut bus, 0xDF2A), 3);
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
        assert_eq!(cpu.registers.register_at(REG_LR), RAM + 2);
        assert_eq!(cpu.spsr().map(|p| p.cpu_state()), Some(CpuState::Thumb));

        let mut cpu = thumb_cpu();
        assert_eq!(run(&mut cpu, &mut bus, 0xE800), 3);
        assert_eq!(cpu.cpsr.mode(), Mode::Undefined);
        assert_eq!(cpu.registers.program_counter(), 0x04);
        assert_eq!(cpu.registers.register_at(REG_LR), RAM + 2);
    }
}
