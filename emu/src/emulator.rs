//! Top-level machine: two cores sharing one [`Bus`].
//!
//! A [`Emulator::step`] runs one primary-core instruction, then one COP
//! instruction if the system controller lets the COP run, then advances the
//! timers and audio by the primary's cycle count.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::bus::{Bus, BusStats, MemoryRegion};
use crate::config::EmulatorConfig;
use crate::cpu::arm7tdmi::Arm7tdmi;
use crate::cpu::hardware::CoreId;
use crate::cpu::hardware::ata::AtaStats;
use crate::cpu::hardware::cache::CacheStats;
use crate::cpu::hardware::click_wheel::{Button, ClickWheelStats};
use crate::cpu::hardware::dma::DmaStats;
use crate::cpu::hardware::gpio::GpioStats;
use crate::cpu::hardware::i2c::I2cStats;
use crate::cpu::hardware::i2s::I2sStats;
use crate::cpu::hardware::interrupt_control::InterruptStats;
use crate::cpu::hardware::lcd::{Color, LcdStats};
use crate::cpu::hardware::system_controller::{CopState, SystemStats};
use crate::cpu::hardware::timers::TimerStats;
use crate::cpu::psr::Psr;
use crate::disk::DiskBackend;
use crate::error::Result;
use crate::gdb::{CPSR_INDEX, DebugStats, DebugTarget, GdbStub};

/// Instructions between debugger polls while running.
const DEBUG_POLL_INTERVAL: u32 = 4096;

const HALTED_POLL_SLEEP: Duration = Duration::from_millis(1);

/// Snapshot of every counter in the machine.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmulatorStats {
    pub total_cycles: u64,
    pub cop_cycles: u64,
    pub cpu_instructions: u64,
    pub cop_instructions: u64,
    pub cop_state: CopState,
    pub bus: BusStats,
    pub interrupts: InterruptStats,
    pub timers: TimerStats,
    pub gpio: GpioStats,
    pub system: SystemStats,
    pub cache: CacheStats,
    pub dma: DmaStats,
    pub ata: AtaStats,
    pub i2s: I2sStats,
    pub i2c: I2cStats,
    pub click_wheel: ClickWheelStats,
    pub lcd: LcdStats,
    pub debug: Option<DebugStats>,
}

/// The primary core and the bus as seen by the debugger.
struct PrimaryCore<'a> {
    cpu: &'a mut Arm7tdmi,
    bus: &'a mut Bus,
}

impl DebugTarget for PrimaryCore<'_> {
    fn read_register(&self, index: usize) -> u32 {
        if index == CPSR_INDEX {
            u32::from(self.cpu.cpsr)
        } else {
            self.cpu.registers.register_at(index)
        }
    }

    fn write_register(&mut self, index: usize, value: u32) {
        if index == CPSR_INDEX {
            self.cpu.write_cpsr(Psr::from(value));
        } else {
            self.cpu.registers.set_register_at(index, value);
        }
    }

    fn read_memory(&mut self, address: u32) -> u8 {
        self.bus.read_byte(address)
    }

    fn write_memory(&mut self, address: u32, value: u8) {
        self.bus.write_byte(address, value);
    }
}

pub struct Emulator {
    config: EmulatorConfig,
    pub cpu: Arm7tdmi,
    pub cop: Arm7tdmi,
    pub bus: Bus,
    debugger: Option<GdbStub>,
    total_cycles: u64,
    cop_cycles: u64,
    steps: u32,
}

impl Emulator {
    /// Builds a machine from `config`, loading its boot image if any.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or an unreadable boot image.
    pub fn new(config: EmulatorConfig) -> Result<Self> {
        config.validate()?;
        let boot_image = config.load_boot_image()?;
        let bus = Bus::new(&config, boot_image)?;

        let mut emulator = Self {
            config,
            cpu: Arm7tdmi::default(),
            cop: Arm7tdmi::default(),
            bus,
            debugger: None,
            total_cycles: 0,
            cop_cycles: 0,
            steps: 0,
        };
        emulator.reset();
        tracing::info!(
            "emulator ready: {} MiB SDRAM, {} Hz",
            emulator.config.ram_size / (1024 * 1024),
            emulator.config.clock_hz
        );

        Ok(emulator)
    }

    #[must_use]
    pub const fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Resets both cores, the peripherals and the counters. Memory and the
    /// attached disk are kept.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(self.config.entry_point);
        self.init_cop(self.config.cop_entry_point.unwrap_or(self.config.entry_point));
        self.total_cycles = 0;
        self.cop_cycles = 0;
        self.steps = 0;
    }

    /// Resets the COP to `entry` and puts it to sleep until the primary
    /// core wakes it.
    pub fn init_cop(&mut self, entry: u32) {
        self.cop.reset(entry);
        self.bus.system.set_cop_state(CopState::Sleeping);
    }

    /// Runs one step and returns the primary core's cycle count.
    pub fn step(&mut self) -> u32 {
        let cpu_irq = self.bus.interrupts.has_pending_irq(CoreId::Cpu);
        let cpu_fiq = self.bus.interrupts.has_pending_fiq(CoreId::Cpu);
        self.cpu.set_irq_line(cpu_irq);
        self.cpu.set_fiq_line(cpu_fiq);

        let cycles = if self.bus.system.primary_sleeping() {
            self.bus.system.wake_primary_on_interrupt(cpu_irq || cpu_fiq);
            1
        } else {
            self.cpu.step(&mut self.bus)
        };

        if self.bus.system.tick_cop_state() {
            self.bus.set_accessing_core(CoreId::Cop);
            self.cop.set_irq_line(self.bus.interrupts.cop_has_pending_irq());
            self.cop
                .set_fiq_line(self.bus.interrupts.has_pending_fiq(CoreId::Cop));
            self.cop_cycles += u64::from(self.cop.step(&mut self.bus));
            self.bus.set_accessing_core(CoreId::Cpu);
        }

        self.total_cycles += u64::from(cycles);
        self.bus.tick(cycles);

        if let Some(debugger) = &mut self.debugger {
            debugger.after_step(self.cpu.registers.program_counter());
        }

        cycles
    }

    /// Steps until at least `max_cycles` primary cycles have elapsed.
    /// Returns the cycles actually run.
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        let mut elapsed = 0;
        while elapsed < max_cycles {
            if self.debugger.is_some() {
                if self.steps % DEBUG_POLL_INTERVAL == 0 {
                    self.poll_debug();
                }
                while self.debug_halted() {
                    thread::sleep(HALTED_POLL_SLEEP);
                    self.poll_debug();
                }
            }

            elapsed += u64::from(self.step());
            self.steps = self.steps.wrapping_add(1);
        }
        elapsed
    }

    /// Runs one frame's worth of cycles at the configured clock and frame rate.
    pub fn run_frame(&mut self) -> u64 {
        self.run(self.config.cycles_per_frame())
    }

    /// Copies `bytes` into a memory at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the data does not fit the region.
    pub fn load_at_offset(&mut self, region: MemoryRegion, offset: usize, bytes: &[u8]) -> Result<()> {
        self.bus.load_at_offset(region, offset, bytes)
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[Color] {
        self.bus.lcd.framebuffer()
    }

    pub fn press_button(&mut self, button: Button) {
        self.bus
            .click_wheel
            .press_button(button, &mut self.bus.interrupts);
    }

    pub fn release_button(&mut self, button: Button) {
        self.bus
            .click_wheel
            .release_button(button, &mut self.bus.interrupts);
    }

    /// Turns the wheel by `delta` positions, positive is clockwise.
    pub fn rotate_wheel(&mut self, delta: i32) {
        self.bus.click_wheel.rotate(delta, &mut self.bus.interrupts);
    }

    pub fn release_wheel(&mut self) {
        self.bus.click_wheel.release_touch(&mut self.bus.interrupts);
    }

    pub fn set_hold_switch(&mut self, hold: bool) {
        self.bus.gpio.set_hold_switch(hold, &mut self.bus.interrupts);
    }

    pub fn attach_disk_backend(&mut self, backend: Box<dyn DiskBackend>) {
        self.bus.ata.attach_backend(backend);
    }

    pub fn take_audio_samples(&mut self) -> Vec<i16> {
        self.bus.i2s.take_samples()
    }

    /// Starts the debug stub on `port` and returns the bound port.
    ///
    /// # Errors
    ///
    /// Fails if the port is unavailable.
    pub fn enable_debug(&mut self, port: u16) -> Result<u16> {
        let stub = GdbStub::bind(port)?;
        let bound = stub.local_port()?;
        self.debugger = Some(stub);
        Ok(bound)
    }

    /// Services the debug stub without blocking.
    pub fn poll_debug(&mut self) {
        let Some(debugger) = &mut self.debugger else {
            return;
        };
        let mut target = PrimaryCore {
            cpu: &mut self.cpu,
            bus: &mut self.bus,
        };
        debugger.poll(&mut target);
    }

    #[must_use]
    pub fn debug_halted(&self) -> bool {
        self.debugger.as_ref().is_some_and(GdbStub::is_halted)
    }

    #[must_use]
    pub const fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    #[must_use]
    pub const fn cop_state(&self) -> CopState {
        self.bus.system.cop_state()
    }

    #[must_use]
    pub fn stats(&self) -> EmulatorStats {
        EmulatorStats {
            total_cycles: self.total_cycles,
            cop_cycles: self.cop_cycles,
            cpu_instructions: self.cpu.instructions_retired(),
            cop_instructions: self.cop.instructions_retired(),
            cop_state: self.cop_state(),
            bus: self.bus.stats(),
            interrupts: self.bus.interrupts.stats(),
            timers: self.bus.timers.stats(),
            gpio: self.bus.gpio.stats(),
            system: self.bus.system.stats(),
            cache: self.bus.cache.stats(),
            dma: self.bus.dma.stats(),
            ata: self.bus.ata.stats(),
            i2s: self.bus.i2s.stats(),
            i2c: self.bus.i2c.stats(),
            click_wheel: self.bus.click_wheel.stats(),
            lcd: self.bus.lcd.stats(),
            debug: self.debugger.as_ref().map(GdbStub::stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SDRAM_BASE;
    use crate::cpu::cpu_modes::Mode;
    use crate::cpu::hardware::interrupt_control::InterruptMask;
    use crate::disk::MemoryDisk;
    use pretty_assertions::assert_eq;

    const ATA: u32 = 0xC300_0000;
    const DATA: u32 = ATA + 0x1E0;
    const ERROR: u32 = ATA + 0x1E4;
    const NSECTOR: u32 = ATA + 0x1E8;
    const SECTOR: u32 = ATA + 0x1EC;
    const LCYL: u32 = ATA + 0x1F0;
    const HCYL: u32 = ATA + 0x1F4;
    const SELECT: u32 = ATA + 0x1F8;
    const COMMAND: u32 = ATA + 0x1FC;

    fn emulator() -> Emulator {
        Emulator::new(EmulatorConfig::default()).unwrap()
    }

    fn load_program(emu: &mut Emulator, offset: usize, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        emu.load_at_offset(MemoryRegion::Sdram, offset, &bytes).unwrap();
    }

    fn ata_command(emu: &mut Emulator, lba: u32, count: u8, command: u8) {
        emu.bus.write_byte(NSECTOR, count);
        emu.bus.write_byte(SECTOR, lba as u8);
        emu.bus.write_byte(LCYL, (lba >> 8) as u8);
        emu.bus.write_byte(HCYL, (lba >> 16) as u8);
        emu.bus.write_byte(SELECT, 0xE0 | ((lba >> 24) as u8 & 0x0F));
        emu.bus.write_byte(COMMAND, command);
    }

    #[test]
    fn mov_immediate_end_to_end() {
        let mut emu = emulator();
        // mov r0, #0x42
        load_program(&mut emu, 0, &[0xE3A0_0042]);
        emu.reset();

        let cycles = emu.step();

        assert_eq!(emu.cpu.registers.register_at(0), 0x42);
        assert_eq!(emu.cpu.registers.program_counter(), SDRAM_BASE + 4);
        assert!(cycles > 0);
        assert_eq!(emu.total_cycles(), u64::from(cycles));
    }

    #[test]
    fn unmapped_read_is_zero() {
        let mut emu = emulator();

        assert_eq!(emu.bus.read_word(0x2000_0000), 0);
        assert_eq!(emu.stats().bus.unmapped_reads, 1);
    }

    /// Primary: r1 = COP_CTL, store 0 to wake the COP, spin.
    /// COP at +0x100: mov r3, #7, spin.
    fn cop_wake_program(emu: &mut Emulator) {
        load_program(
            emu,
            0,
            &[
                0xE3A0_1206, // mov r1, #0x60000000
                0xE281_1A07, // add r1, r1, #0x7000
                0xE3A0_2000, // mov r2, #0
                0xE581_2004, // str r2, [r1, #4]
                0xEAFF_FFFE, // b .
            ],
        );
        load_program(emu, 0x100, &[0xE3A0_3007, 0xEAFF_FFFE]);
        emu.init_cop(SDRAM_BASE + 0x100);
    }

    #[test]
    fn cop_runs_only_after_wake() {
        let mut emu = emulator();
        cop_wake_program(&mut emu);

        for _ in 0..3 {
            emu.step();
        }
        assert_eq!(emu.cop_state(), CopState::Sleeping);
        assert_eq!(emu.cop.registers.register_at(3), 0);

        emu.step();
        emu.step();

        assert_eq!(emu.cop_state(), CopState::Running);
        assert_eq!(emu.cop.registers.register_at(3), 7);
        assert!(emu.stats().cop_instructions >= 1);
    }

    #[test]
    fn disabled_cop_ignores_wake() {
        let config = EmulatorConfig {
            cop_enabled: false,
            ..EmulatorConfig::default()
        };
        let mut emu = Emulator::new(config).unwrap();
        cop_wake_program(&mut emu);

        for _ in 0..10 {
            emu.step();
        }

        assert_eq!(emu.cop_state(), CopState::Sleeping);
        assert_eq!(emu.cop.registers.register_at(3), 0);
        assert_eq!(emu.stats().cop_instructions, 0);
    }

    #[test]
    fn masked_interrupt_is_not_taken() {
        let mut emu = emulator();
        emu.cpu.write_cpsr(Psr::from(0x13));

        emu.bus.interrupts.set_pending(InterruptMask::TIMER1);
        emu.step();
        assert_eq!(emu.cpu.registers.program_counter(), SDRAM_BASE + 4);

        emu.bus
            .interrupts
            .set_enabled(CoreId::Cpu, InterruptMask::TIMER1, true);
        emu.step();

        assert_eq!(emu.cpu.registers.program_counter(), 0x18);
        assert_eq!(emu.cpu.cpsr.mode(), Mode::Irq);
    }

    #[test]
    fn ata_sector_round_trip_through_bus() {
        let mut emu = emulator();
        emu.attach_disk_backend(Box::new(MemoryDisk::new(64)));

        let mut pattern = vec![0xAA_u8; 512];
        pattern[0] = 0x55;

        ata_command(&mut emu, 10, 1, 0x30);
        for byte in &pattern {
            emu.bus.write_byte(DATA, *byte);
        }
        assert_eq!(emu.bus.read_byte(COMMAND) & 0x89, 0x00);

        ata_command(&mut emu, 10, 1, 0x20);
        assert_eq!(emu.bus.read_byte(COMMAND) & 0x08, 0x08);
        let sector: Vec<u8> = (0..512).map(|_| emu.bus.read_byte(DATA)).collect();

        assert_eq!(sector, pattern);
        assert_eq!(emu.bus.read_byte(COMMAND) & 0x08, 0);
    }

    #[test]
    fn ata_identify_reports_capacity() {
        let mut emu = emulator();
        emu.attach_disk_backend(Box::new(MemoryDisk::new(1000)));

        ata_command(&mut emu, 0, 1, 0xEC);
        let words: Vec<u16> = (0..256).map(|_| emu.bus.read_half_word(DATA)).collect();

        assert_eq!(words[60], 1000);
        assert_eq!(words[61], 0);
        assert_eq!(words[100], 1000);
    }

    #[test]
    fn ata_without_backend_aborts() {
        let mut emu = emulator();

        ata_command(&mut emu, 0, 1, 0x20);

        let status = emu.bus.read_byte(COMMAND);
        assert_eq!(status & 0x01, 0x01);
        assert_eq!(status & 0x40, 0);
        assert_eq!(emu.bus.read_byte(ERROR) & 0x04, 0x04);
    }

    #[test]
    fn primary_sleeps_until_interrupt() {
        let mut emu = emulator();
        load_program(
            &mut emu,
            0,
            &[
                0xE3A0_1206, // mov r1, #0x60000000
                0xE281_1A07, // add r1, r1, #0x7000
                0xE3A0_2102, // mov r2, #0x80000000
                0xE581_2000, // str r2, [r1]
                0xE3A0_3001, // mov r3, #1
            ],
        );
        for _ in 0..4 {
            emu.step();
        }

        assert_eq!(emu.step(), 1);
        assert_eq!(emu.step(), 1);
        assert_eq!(emu.cpu.registers.register_at(3), 0);

        emu.bus
            .interrupts
            .set_enabled(CoreId::Cpu, InterruptMask::TIMER1, true);
        emu.bus.interrupts.set_pending(InterruptMask::TIMER1);
        emu.step();
        emu.step();

        assert_eq!(emu.cpu.registers.register_at(3), 1);
    }

    #[test]
    fn run_frame_spends_a_frame() {
        let mut emu = emulator();
        let expected = emu.config().cycles_per_frame();

        let cycles = emu.run_frame();

        assert!(cycles >= expected);
        assert_eq!(emu.total_cycles(), cycles);
        assert!(emu.stats().timers.elapsed_micros > 0);
    }

    #[test]
    fn reset_keeps_memory_and_clears_counters() {
        let mut emu = emulator();
        load_program(&mut emu, 0, &[0xE3A0_0042]);
        emu.step();

        emu.reset();

        assert_eq!(emu.total_cycles(), 0);
        assert_eq!(emu.cpu.registers.program_counter(), SDRAM_BASE);
        assert_eq!(emu.bus.read_word(SDRAM_BASE), 0xE3A0_0042);
        assert_eq!(emu.cop_state(), CopState::Sleeping);
    }

    #[test]
    fn input_reaches_click_wheel() {
        let mut emu = emulator();

        emu.press_button(Button::Menu);
        emu.rotate_wheel(5);

        assert_eq!(emu.bus.read_word(0x7000_C140), 0xC005_101A);
        assert!(emu.bus.interrupts.is_pending(InterruptMask::I2C));
    }

    #[test]
    fn enable_debug_binds_free_port() {
        let mut emu = emulator();

        let port = emu.enable_debug(0).unwrap();
        emu.poll_debug();

        assert_ne!(port, 0);
        assert!(!emu.debug_halted());
        assert_eq!(emu.stats().debug.map(|d| d.connections), Some(0));
    }
}
