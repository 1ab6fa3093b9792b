//! # ARM7TDMI core
//!
//! One core of the SoC. Both the primary CPU and the COP are instances of
//! [`Arm7tdmi`]; they share the [`Bus`] handed to [`Arm7tdmi::step`].
//!
//! ```text
//!   step()
//!     │
//!     ├─ FIQ line up and F clear? ──► enter FIQ (vector 0x1C)
//!     ├─ IRQ line up and I clear? ──► enter IRQ (vector 0x18)
//!     │
//!     ├─ fetch (word in ARM, halfword in Thumb)
//!     ├─ decode
//!     ├─ condition check (ARM only)
//!     ├─ execute, returns the cycle cost
//!     └─ advance PC unless the instruction wrote it
//! ```
//!
//! R15 holds the address of the instruction being executed. Operand reads of
//! R15 see it plus the pipeline offset: +8 in ARM state (+12 for the store
//! value of STR/STM and for register-specified shifts), +4 in Thumb state.

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm::mode::ArmModeOpcode;
use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::{BankIndex, RegisterBank};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP, Registers};
use crate::cpu::thumb::mode::ThumbModeOpcode;

/// Cycles charged for entering any exception.
pub const EXCEPTION_ENTRY_CYCLES: u32 = 3;

/// Processor exceptions, in the order of their vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exception {
    Reset,
    Undefined,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::Undefined => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt => Mode::Supervisor,
            Self::Undefined => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub cpsr: Psr,
    pub registers: Registers,
    pub register_bank: RegisterBank,

    /// Level of the IRQ input, driven by the interrupt controller.
    irq_line: bool,

    /// Level of the FIQ input, driven by the interrupt controller.
    fiq_line: bool,

    /// Set when the current instruction wrote R15.
    pipeline_flushed: bool,

    instructions_retired: u64,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        let mut cpsr = Psr::from(Mode::Supervisor);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);

        Self {
            cpsr,
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            irq_line: false,
            fiq_line: false,
            pipeline_flushed: false,
            instructions_retired: 0,
        }
    }
}

impl Arm7tdmi {
    /// Puts the core in its reset state (Supervisor, ARM, interrupts masked) with PC at `entry_point`.
    pub fn reset(&mut self, entry_point: u32) {
        *self = Self::default();
        self.registers.set_program_counter(entry_point);
    }

    #[must_use]
    pub fn decode<T>(op_code: u32) -> T
    where
        T: From<u32>,
    {
        T::from(op_code)
    }

    pub const fn set_irq_line(&mut self, level: bool) {
        self.irq_line = level;
    }

    pub const fn set_fiq_line(&mut self, level: bool) {
        self.fiq_line = level;
    }

    #[must_use]
    pub const fn instructions_retired(&self) -> u64 {
        self.instructions_retired
    }

    /// Executes one instruction (or takes one pending interrupt) and returns its cycle cost.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        let pc = self.registers.program_counter();

        if self.fiq_line && !self.cpsr.fiq_disable() {
            return self.enter_exception(Exception::Fiq, pc.wrapping_add(4));
        }
        if self.irq_line && !self.cpsr.irq_disable() {
            return self.enter_exception(Exception::Irq, pc.wrapping_add(4));
        }

        self.pipeline_flushed = false;

        let (cycles, size) = match self.cpsr.cpu_state() {
            CpuState::Arm => {
                let pc = pc & !3;
                self.registers.set_program_counter(pc);
                let op_code: ArmModeOpcode = Self::decode(bus.read_word(pc));
                tracing::trace!("{pc:08X}: {op_code}");
                (self.execute_arm(bus, op_code), 4)
            }
            CpuState::Thumb => {
                let pc = pc & !1;
                self.registers.set_program_counter(pc);
                let op_code: ThumbModeOpcode = Self::decode(u32::from(bus.read_half_word(pc)));
                tracing::trace!("{pc:08X}: {op_code}");
                (self.execute_thumb(bus, op_code), 2)
            }
        };

        if !self.pipeline_flushed {
            self.registers.advance_program_counter(size);
        }
        self.instructions_retired += 1;

        cycles
    }

    /// Runs an already decoded ARM opcode at the current PC.
    pub fn execute_arm(&mut self, bus: &mut Bus, op_code: ArmModeOpcode) -> u32 {
        if !self.cpsr.can_execute(op_code.condition) {
            return 1;
        }
        self.dispatch_arm(bus, op_code.instruction)
    }

    /// Runs an already decoded Thumb opcode at the current PC.
    pub fn execute_thumb(&mut self, bus: &mut Bus, op_code: ThumbModeOpcode) -> u32 {
        self.dispatch_thumb(bus, op_code.instruction)
    }

    /// Saves CPSR into the new mode's SPSR, banks registers, sets LR to `return_address`
    /// and jumps to the exception vector.
    pub fn enter_exception(&mut self, exception: Exception, return_address: u32) -> u32 {
        let old_cpsr = self.cpsr;
        let mode = exception.mode();

        let mut new_cpsr = old_cpsr;
        new_cpsr.set_mode(mode);
        new_cpsr.set_cpu_state(CpuState::Arm);
        new_cpsr.set_irq_disable(true);
        if matches!(exception, Exception::Fiq | Exception::Reset) {
            new_cpsr.set_fiq_disable(true);
        }
        self.write_cpsr(new_cpsr);

        self.register_bank.set_spsr(mode, old_cpsr);
        self.registers.set_register_at(REG_LR, return_address);
        self.registers.set_program_counter(exception.vector());
        self.pipeline_flushed = true;

        tracing::debug!(
            "{exception:?} from {:?} at 0x{:08X}, return 0x{return_address:08X}",
            old_cpsr.mode(),
            self.registers.program_counter()
        );

        EXCEPTION_ENTRY_CYCLES
    }

    /// Writes the whole CPSR, banking registers first if the mode field changes.
    pub fn write_cpsr(&mut self, value: Psr) {
        let raw = u32::from(value);
        let value = if Mode::try_from(raw & 0b1_1111).is_ok() {
            value
        } else {
            tracing::debug!("ignoring invalid mode bits in CPSR write 0x{raw:08X}");
            Psr::from((raw & !0b1_1111) | (u32::from(self.cpsr) & 0b1_1111))
        };

        self.switch_bank(self.cpsr.mode(), value.mode());
        self.cpsr = value;
    }

    /// SPSR of the current mode. User and System have none.
    #[must_use]
    pub fn spsr(&self) -> Option<Psr> {
        self.register_bank.spsr(self.cpsr.mode())
    }

    pub fn set_spsr(&mut self, value: Psr) {
        self.register_bank.set_spsr(self.cpsr.mode(), value);
    }

    fn switch_bank(&mut self, from: Mode, to: Mode) {
        let from_idx = BankIndex::from(from);
        let to_idx = BankIndex::from(to);
        if from_idx == to_idx {
            return;
        }

        let leaving_fiq = from_idx == BankIndex::Fiq;
        let entering_fiq = to_idx == BankIndex::Fiq;
        if leaving_fiq || entering_fiq {
            let (save, load) = if leaving_fiq {
                (&mut self.register_bank.r8_r12_fiq, self.register_bank.r8_r12_usr)
            } else {
                (&mut self.register_bank.r8_r12_usr, self.register_bank.r8_r12_fiq)
            };
            for (idx, slot) in save.iter_mut().enumerate() {
                *slot = self.registers.register_at(8 + idx);
                self.registers.set_register_at(8 + idx, load[idx]);
            }
        }

        self.register_bank.sp_lr[from_idx as usize] = [
            self.registers.register_at(REG_SP),
            self.registers.register_at(REG_LR),
        ];
        let [sp, lr] = self.register_bank.sp_lr[to_idx as usize];
        self.registers.set_register_at(REG_SP, sp);
        self.registers.set_register_at(REG_LR, lr);
    }

    /// Value of `reg` as an instruction operand, R15 reads include `pc_offset`.
    #[must_use]
    pub fn operand_register(&self, reg: usize, pc_offset: u32) -> u32 {
        if reg == REG_PROGRAM_COUNTER {
            self.registers.program_counter().wrapping_add(pc_offset)
        } else {
            self.registers.register_at(reg)
        }
    }

    /// Writes a register. Writing R15 branches: the value is aligned to the current state.
    pub fn write_register(&mut self, reg: usize, value: u32) {
        if reg == REG_PROGRAM_COUNTER {
            let mask = match self.cpsr.cpu_state() {
                CpuState::Arm => !3,
                CpuState::Thumb => !1,
            };
            self.registers.set_program_counter(value & mask);
            self.pipeline_flushed = true;
        } else {
            self.registers.set_register_at(reg, value);
        }
    }

    /// Reads the User-mode view of `reg`, as seen by `LDM/STM` with the S bit.
    #[must_use]
    pub fn user_register_at(&self, reg: usize) -> u32 {
        let bank = BankIndex::from(self.cpsr.mode());
        match reg {
            8..=12 if bank == BankIndex::Fiq => self.register_bank.r8_r12_usr[reg - 8],
            13 | 14 if bank != BankIndex::User => {
                self.register_bank.sp_lr[BankIndex::User as usize][reg - 13]
            }
            _ => self.registers.register_at(reg),
        }
    }

    pub fn set_user_register_at(&mut self, reg: usize, value: u32) {
        let bank = BankIndex::from(self.cpsr.mode());
        match reg {
            8..=12 if bank == BankIndex::Fiq => self.register_bank.r8_r12_usr[reg - 8] = value,
            13 | 14 if bank != BankIndex::User => {
                self.register_bank.sp_lr[BankIndex::User as usize][reg - 13] = value;
            }
            _ => self.write_register(reg, value),
        }
    }

    /// Word load with the ARM7TDMI rotation for misaligned addresses.
    pub fn load_word(bus: &mut Bus, address: u32) -> u32 {
        bus.read_word(address & !3)
            .rotate_right((address & 3) * 8)
    }

    /// Halfword load, an odd address rotates the value by a byte.
    pub fn load_half_word(bus: &mut Bus, address: u32) -> u32 {
        u32::from(bus.read_half_word(address & !1)).rotate_right((address & 1) * 8)
    }

    /// Sign-extending halfword load, an odd address degrades to a signed byte load.
    pub fn load_signed_half_word(bus: &mut Bus, address: u32) -> u32 {
        if address & 1 == 1 {
            bus.read_byte(address) as i8 as i32 as u32
        } else {
            bus.read_half_word(address) as i16 as i32 as u32
        }
    }

    pub fn load_signed_byte(bus: &mut Bus, address: u32) -> u32 {
        bus.read_byte(address) as i8 as i32 as u32
    }

    /// PC plus the pipeline offset of the current state.
    #[must_use]
    pub fn pipelined_pc(&self) -> u32 {
        let offset = match self.cpsr.cpu_state() {
            CpuState::Arm => 8,
            CpuState::Thumb => 4,
        };
        self.registers.program_counter().wrapping_add(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::flags::Offsetting;
    use pretty_assertions::assert_eq;

    const RAM: u32 = 0x1000_0000;

    fn load_program(bus: &mut Bus, address: u32, program: &[u32]) {
        for (idx, op) in program.iter().enumerate() {
            bus.write_word(address + idx as u32 * 4, *op);
        }
    }

    #[test]
    fn reset_state() {
        let mut cpu = Arm7tdmi::default();
        cpu.registers.set_register_at(3, 7);
        cpu.reset(RAM);

        assert_eq!(cpu.registers.program_counter(), RAM);
        assert_eq!(cpu.registers.register_at(3), 0);
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert!(cpu.cpsr.irq_disable());
        assert!(cpu.cpsr.fiq_disable());
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Arm);
    }

    #[test]
    fn step_advances_pc() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        // MOV R0, #0x42 ; MOV R1, #1
        load_program(&mut bus, RAM, &[0xE3A0_0042, 0xE3A0_1001]);
        cpu.reset(RAM);

        assert_eq!(cpu.step(&mut bus), 1);
        assert_eq!(cpu.registers.register_at(0), 0x42);
        assert_eq!(cpu.registers.program_counter(), RAM + 4);

        cpu.step(&mut bus);
        assert_eq!(cpu.registers.register_at(1), 1);
        assert_eq!(cpu.instructions_retired(), 2);
    }

    #[test]
    fn branch_to_self_does_not_advance() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        load_program(&mut bus, RAM, &[0xEAFF_FFFE]);
        cpu.reset(RAM);

        assert_eq!(cpu.step(&mut bus), 3);
        assert_eq!(cpu.registers.program_counter(), RAM);
    }

    #[test]
    fn failed_condition_costs_one_cycle() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        // MOVEQ R0, #1 with Z clear
        load_program(&mut bus, RAM, &[0x03A0_0001]);
        cpu.reset(RAM);

        assert_eq!(cpu.step(&mut bus), 1);
        assert_eq!(cpu.registers.register_at(0), 0);
        assert_eq!(cpu.registers.program_counter(), RAM + 4);
    }

    #[test]
    fn irq_is_masked_by_cpsr() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        load_program(&mut bus, RAM, &[0xE3A0_0042]);
        cpu.reset(RAM);
        cpu.set_irq_line(true);

        // I is set after reset, the instruction runs normally.
        assert_eq!(cpu.step(&mut bus), 1);
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert_eq!(cpu.registers.register_at(0), 0x42);
    }

    #[test]
    fn irq_entry_and_return() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        // Handler at the IRQ vector (low vectors alias RAM): SUBS PC, LR, #4
        bus.write_word(0x18, 0xE25E_F004);
        load_program(&mut bus, RAM, &[0xE3A0_0042]);
        cpu.reset(RAM);

        let mut cpsr = cpu.cpsr;
        cpsr.set_mode(Mode::System);
        cpsr.set_irq_disable(false);
        cpsr.set_carry_flag(true);
        cpu.write_cpsr(cpsr);
        cpu.registers.set_register_at(REG_LR, 0xDEAD);
        cpu.set_irq_line(true);

        assert_eq!(cpu.step(&mut bus), EXCEPTION_ENTRY_CYCLES);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert!(cpu.cpsr.irq_disable());
        assert!(!cpu.cpsr.fiq_disable());
        assert_eq!(cpu.registers.program_counter(), 0x18);
        assert_eq!(cpu.registers.register_at(REG_LR), RAM + 4);
        assert_eq!(cpu.spsr(), Some(cpsr));

        cpu.set_irq_line(false);
        cpu.step(&mut bus);
        assert_eq!(cpu.cpsr, cpsr);
        assert_eq!(cpu.registers.program_counter(), RAM);
        // System shares the User bank, LR survives the round trip.
        assert_eq!(cpu.registers.register_at(REG_LR), 0xDEAD);
    }

    #[test]
    fn fiq_has_priority_and_banks_r8_r12() {
        let mut cpu = Arm7tdmi::default();
        let mut bus = Bus::default();
        cpu.reset(RAM);
        let mut cpsr = cpu.cpsr;
        cpsr.set_irq_disable(false);
        cpsr.set_fiq_disable(false);
        cpu.write_cpsr(cpsr);
        for reg in 8..=12 {
            cpu.registers.set_register_at(reg, reg as u32);
        }

        cpu.set_irq_line(true);
        cpu.set_fiq_line(true);
        cpu.step(&mut bus);

        assert_eq!(cpu.cpsr.mode(), Mode::Fiq);
        assert!(cpu.cpsr.fiq_disable());
        assert_eq!(cpu.registers.program_counter(), 0x1C);
        for reg in 8..=12 {
            assert_eq!(cpu.registers.register_at(reg), 0);
            cpu.registers.set_register_at(reg, 0xF0 + reg as u32);
        }

        cpu.write_cpsr(cpsr);
        for reg in 8..=12 {
            assert_eq!(cpu.registers.register_at(reg), reg as u32);
        }
        assert_eq!(cpu.register_bank.r8_r12_fiq, [0xF8, 0xF9, 0xFA, 0xFB, 0xFC]);
    }

    #[test]
    fn mode_round_trip_preserves_registers() {
        let mut cpu = Arm7tdmi::default();
        cpu.reset(RAM);
        cpu.registers.set_register_at(REG_SP, 0x4001_7000);
        let svc = cpu.cpsr;

        for mode in [Mode::Irq, Mode::Abort, Mode::Undefined, Mode::Fiq, Mode::System] {
            let mut next = svc;
            next.set_mode(mode);
            cpu.write_cpsr(next);
            cpu.registers.set_register_at(REG_SP, 0x100 + mode as u32);
            cpu.write_cpsr(svc);
            assert_eq!(cpu.registers.register_at(REG_SP), 0x4001_7000);
        }

        let mut irq = svc;
        irq.set_mode(Mode::Irq);
        cpu.write_cpsr(irq);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x100 + Mode::Irq as u32);
    }

    #[test]
    fn invalid_mode_write_keeps_mode() {
        let mut cpu = Arm7tdmi::default();
        cpu.write_cpsr(Psr::from(0xF000_0000));
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert!(cpu.cpsr.sign_flag());
    }

    #[test]
    fn user_bank_view() {
        let mut cpu = Arm7tdmi::default();
        cpu.reset(RAM);
        cpu.register_bank.sp_lr[BankIndex::User as usize] = [0x1111, 0x2222];
        cpu.registers.set_register_at(REG_SP, 0x3333);

        assert_eq!(cpu.user_register_at(REG_SP), 0x1111);
        cpu.set_user_register_at(REG_LR, 0x4444);
        assert_eq!(cpu.register_bank.sp_lr[BankIndex::User as usize], [0x1111, 0x4444]);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x3333);
    }

    #[test]
    fn misaligned_loads_rotate() {
        let mut bus = Bus::default();
        bus.write_word(RAM, 0x1122_3344);

        assert_eq!(Arm7tdmi::load_word(&mut bus, RAM + 1), 0x4411_2233);
        assert_eq!(Arm7tdmi::load_half_word(&mut bus, RAM + 1), 0x4400_0033);
        assert_eq!(Arm7tdmi::load_signed_half_word(&mut bus, RAM + 3), 0x11);
        assert_eq!(Offsetting::Down.apply(RAM, 4), RAM - 4);
    }
}
