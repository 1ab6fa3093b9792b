//! The system bus.
//!
//! Owns the memories and every peripheral, and routes each access through
//! a sorted region table. Peripherals see an offset relative to their
//! region's base, plus an [`IoContext`] carrying the accessing core and
//! the interrupt controller.
//!
//! | range                       | target                              |
//! |-----------------------------|-------------------------------------|
//! | `0x0000_0000 - 0x000F_FFFF` | boot image, or SDRAM alias          |
//! | `0x1000_0000 - ...`         | SDRAM                               |
//! | `0x3000_0000 - 0x3003_FFFF` | LCD bridge                          |
//! | `0x4000_0000 - 0x4001_7FFF` | IRAM                                |
//! | `0x6000_0000 - 0x6000_1FFF` | system controller (id, mailbox)     |
//! | `0x6000_4000 - 0x6000_41FF` | interrupt controller                |
//! | `0x6000_5000 - 0x6000_50FF` | timers                              |
//! | `0x6000_6000 - 0x6000_7FFF` | system controller (clocks, CPU_CTL) |
//! | `0x6000_A000 - 0x6000_B0FF` | DMA                                 |
//! | `0x6000_C000 - 0x6000_CFFF` | cache controller                    |
//! | `0x6000_D000 - 0x6000_DFFF` | GPIO                                |
//! | `0x7000_0000 - 0x7000_00FF` | chip id                             |
//! | `0x7000_2800 - 0x7000_28FF` | I2S                                 |
//! | `0x7000_C000 - 0x7000_C0FF` | I2C                                 |
//! | `0x7000_C100 - 0x7000_C1FF` | click wheel                         |
//! | `0xC300_0000 - 0xC300_03FF` | ATA                                 |
//! | `0xF000_0000 - 0xF000_FFFF` | cache flush window                  |
//!
//! Unmapped reads return 0 and unmapped writes are dropped. Halfword and
//! word accesses are forced to natural alignment here; rotation of
//! misaligned loads is the CPU's business.

use serde::Serialize;

use crate::config::EmulatorConfig;
use crate::cpu::hardware::ata::Ata;
use crate::cpu::hardware::cache::CacheController;
use crate::cpu::hardware::click_wheel::ClickWheel;
use crate::cpu::hardware::dma::Dma;
use crate::cpu::hardware::gpio::Gpio;
use crate::cpu::hardware::i2c::I2c;
use crate::cpu::hardware::i2s::I2s;
use crate::cpu::hardware::internal_memory::MemoryBlock;
use crate::cpu::hardware::interrupt_control::InterruptController;
use crate::cpu::hardware::lcd::Lcd;
use crate::cpu::hardware::system_controller::SystemController;
use crate::cpu::hardware::timers::Timers;
use crate::cpu::hardware::{
    AccessWidth, CoreId, IoContext, IoDevice, merge_lane, read_lane, write_lane,
};
use crate::error::{EmuError, Result};

pub const SDRAM_BASE: u32 = 0x1000_0000;
pub const SDRAM_MAX_SIZE: usize = 256 * 1024 * 1024;
pub const IRAM_BASE: u32 = 0x4000_0000;
pub const IRAM_SIZE: usize = 96 * 1024;
pub const LOW_VECTOR_SIZE: usize = 0x10_0000;

/// Peripherals reachable through the region table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeviceId {
    Lcd,
    SystemController,
    InterruptController,
    Timers,
    Dma,
    Cache,
    Gpio,
    ChipInfo,
    I2s,
    I2c,
    ClickWheel,
    Ata,
    CacheFlush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Target {
    Ram,
    Iram,
    /// Boot image when present, otherwise SDRAM from offset 0.
    LowVector,
    Device(DeviceId),
}

/// An inclusive address range. Accesses reach the target at
/// `address - base`, which lets split windows share one offset origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MappedRegion {
    pub start: u32,
    pub end: u32,
    pub base: u32,
    pub target: Target,
}

impl MappedRegion {
    #[must_use]
    pub const fn new(start: u32, end: u32, target: Target) -> Self {
        Self {
            start,
            end,
            base: start,
            target,
        }
    }

    #[must_use]
    pub const fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Address dispatch table, kept sorted by start address.
#[derive(Clone, Debug, Default)]
pub struct RegionTable {
    regions: Vec<MappedRegion>,
}

impl RegionTable {
    /// The SoC memory map with `ram_size` bytes of SDRAM.
    #[must_use]
    pub fn standard(ram_size: usize) -> Self {
        let ram_end = SDRAM_BASE + (ram_size.clamp(4, SDRAM_MAX_SIZE) as u32 - 1);
        let mut regions = vec![
            MappedRegion::new(0x0000_0000, LOW_VECTOR_SIZE as u32 - 1, Target::LowVector),
            MappedRegion::new(SDRAM_BASE, ram_end, Target::Ram),
            MappedRegion::new(0x3000_0000, 0x3003_FFFF, Target::Device(DeviceId::Lcd)),
            MappedRegion::new(IRAM_BASE, IRAM_BASE + IRAM_SIZE as u32 - 1, Target::Iram),
            MappedRegion::new(0x6000_0000, 0x6000_1FFF, Target::Device(DeviceId::SystemController)),
            MappedRegion::new(0x6000_4000, 0x6000_41FF, Target::Device(DeviceId::InterruptController)),
            MappedRegion::new(0x6000_5000, 0x6000_50FF, Target::Device(DeviceId::Timers)),
            MappedRegion::new(0x6000_6000, 0x6000_7FFF, Target::Device(DeviceId::SystemController))
                .with_base(0x6000_0000),
            MappedRegion::new(0x6000_A000, 0x6000_B0FF, Target::Device(DeviceId::Dma)),
            MappedRegion::new(0x6000_C000, 0x6000_CFFF, Target::Device(DeviceId::Cache)),
            MappedRegion::new(0x6000_D000, 0x6000_DFFF, Target::Device(DeviceId::Gpio)),
            MappedRegion::new(0x7000_0000, 0x7000_00FF, Target::Device(DeviceId::ChipInfo)),
            MappedRegion::new(0x7000_2800, 0x7000_28FF, Target::Device(DeviceId::I2s)),
            MappedRegion::new(0x7000_C000, 0x7000_C0FF, Target::Device(DeviceId::I2c)),
            MappedRegion::new(0x7000_C100, 0x7000_C1FF, Target::Device(DeviceId::ClickWheel)),
            MappedRegion::new(0xC300_0000, 0xC300_03FF, Target::Device(DeviceId::Ata)),
            MappedRegion::new(0xF000_0000, 0xF000_FFFF, Target::Device(DeviceId::CacheFlush)),
        ];
        regions.sort_by_key(|r| r.start);

        Self { regions }
    }

    /// Adds a region.
    ///
    /// # Errors
    ///
    /// Fails if it overlaps an existing region.
    pub fn register(&mut self, region: MappedRegion) -> Result<()> {
        if let Some(existing) = self.regions.iter().find(|r| r.overlaps(&region)) {
            return Err(overlap_error(existing, &region));
        }
        let idx = self.regions.partition_point(|r| r.start < region.start);
        self.regions.insert(idx, region);
        Ok(())
    }

    /// Checks that no two regions overlap.
    ///
    /// # Errors
    ///
    /// Reports the first overlapping pair.
    pub fn validate(&self) -> Result<()> {
        for pair in self.regions.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(overlap_error(&pair[0], &pair[1]));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, address: u32) -> Option<&MappedRegion> {
        let idx = self.regions.partition_point(|r| r.start <= address);
        self.regions
            .get(idx.checked_sub(1)?)
            .filter(|r| address <= r.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedRegion> {
        self.regions.iter()
    }
}

const fn overlap_error(existing: &MappedRegion, new: &MappedRegion) -> EmuError {
    EmuError::OverlappingRegions {
        start: existing.start,
        end: existing.end,
        new_start: new.start,
        new_end: new.end,
    }
}

/// Memories accepting host loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MemoryRegion {
    Sdram,
    Iram,
    Boot,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub reads: u64,
    pub writes: u64,
    pub unmapped_reads: u64,
    pub unmapped_writes: u64,
    pub dma_words: u64,
}

#[derive(Debug)]
pub struct Bus {
    regions: RegionTable,
    ram: MemoryBlock,
    iram: MemoryBlock,
    boot: Option<MemoryBlock>,
    pub interrupts: InterruptController,
    pub timers: Timers,
    pub gpio: Gpio,
    pub system: SystemController,
    pub cache: CacheController,
    pub dma: Dma,
    pub ata: Ata,
    pub i2s: I2s,
    pub i2c: I2c,
    pub click_wheel: ClickWheel,
    pub lcd: Lcd,
    accessing_core: CoreId,
    clock_hz: u32,
    stats: BusStats,
}

impl Default for Bus {
    fn default() -> Self {
        Self::build(&EmulatorConfig::default(), None)
    }
}

impl Bus {
    /// Builds the bus for `config`, mapping `boot_image` over the low
    /// vectors when given.
    ///
    /// # Errors
    ///
    /// Fails for an oversized boot image or an inconsistent memory map.
    pub fn new(config: &EmulatorConfig, boot_image: Option<Vec<u8>>) -> Result<Self> {
        if let Some(image) = &boot_image
            && image.len() > LOW_VECTOR_SIZE
        {
            return Err(EmuError::BootImageTooLarge {
                size: image.len(),
                limit: LOW_VECTOR_SIZE,
            });
        }

        let bus = Self::build(config, boot_image);
        bus.regions.validate()?;
        Ok(bus)
    }

    fn build(config: &EmulatorConfig, boot_image: Option<Vec<u8>>) -> Self {
        Self {
            regions: RegionTable::standard(config.ram_size),
            ram: MemoryBlock::new("sdram", config.ram_size),
            iram: MemoryBlock::new("iram", IRAM_SIZE),
            boot: boot_image.map(|image| MemoryBlock::read_only("boot", image)),
            interrupts: InterruptController::default(),
            timers: Timers::default(),
            gpio: Gpio::default(),
            system: SystemController::new(config.cop_enabled),
            cache: CacheController::default(),
            dma: Dma::default(),
            ata: Ata::default(),
            i2s: I2s::default(),
            i2c: I2c::default(),
            click_wheel: ClickWheel::default(),
            lcd: Lcd::default(),
            accessing_core: CoreId::Cpu,
            clock_hz: config.clock_hz,
            stats: BusStats::default(),
        }
    }

    /// Resets every peripheral. Memory contents and the disk are kept.
    pub fn reset(&mut self) {
        self.interrupts.reset();
        self.timers.reset();
        self.gpio.reset();
        self.system.reset();
        self.cache.reset();
        self.dma.reset();
        self.ata.reset();
        self.i2s.reset();
        self.i2c.reset();
        self.click_wheel.reset();
        self.lcd.reset();
        self.accessing_core = CoreId::Cpu;
    }

    #[must_use]
    pub const fn stats(&self) -> BusStats {
        self.stats
    }

    #[must_use]
    pub const fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub const fn set_accessing_core(&mut self, core: CoreId) {
        self.accessing_core = core;
    }

    #[must_use]
    pub const fn accessing_core(&self) -> CoreId {
        self.accessing_core
    }

    /// Copies `bytes` into a memory at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the data does not fit, or `Boot` is requested without an image.
    pub fn load_at_offset(&mut self, region: MemoryRegion, offset: usize, bytes: &[u8]) -> Result<()> {
        let block = match region {
            MemoryRegion::Sdram => &mut self.ram,
            MemoryRegion::Iram => &mut self.iram,
            MemoryRegion::Boot => match &mut self.boot {
                Some(boot) => boot,
                None => {
                    return Err(EmuError::LoadOutOfBounds {
                        region: "boot",
                        offset,
                        len: bytes.len(),
                        size: 0,
                    });
                }
            },
        };
        block.load(offset, bytes)?;
        tracing::info!("loaded {} bytes into {} at {offset:#x}", bytes.len(), block.name());
        Ok(())
    }

    /// Advances the timers and audio by `cycles`.
    pub fn tick(&mut self, cycles: u32) {
        self.timers.tick(cycles, self.clock_hz, &mut self.interrupts);
        self.i2s
            .tick(cycles, self.clock_hz, &self.i2c, &mut self.interrupts);
    }

    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.read(address, AccessWidth::Byte) as u8
    }

    pub fn read_half_word(&mut self, address: u32) -> u16 {
        self.read(address & !1, AccessWidth::HalfWord) as u16
    }

    pub fn read_word(&mut self, address: u32) -> u32 {
        self.read(address & !3, AccessWidth::Word)
    }

    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.write(address, u32::from(value), AccessWidth::Byte);
    }

    pub fn write_half_word(&mut self, address: u32, value: u16) {
        self.write(address & !1, u32::from(value), AccessWidth::HalfWord);
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        self.write(address & !3, value, AccessWidth::Word);
    }

    fn read(&mut self, address: u32, width: AccessWidth) -> u32 {
        self.stats.reads += 1;
        let Some(region) = self.regions.lookup(address).copied() else {
            self.stats.unmapped_reads += 1;
            tracing::debug!("unmapped read at {address:#010x}");
            return 0;
        };
        let offset = address - region.base;

        match region.target {
            Target::Ram => memory_read(&self.ram, offset, width),
            Target::Iram => memory_read(&self.iram, offset, width),
            Target::LowVector => memory_read(self.boot.as_ref().unwrap_or(&self.ram), offset, width),
            Target::Device(id) => self.device_read(id, offset, width),
        }
    }

    fn write(&mut self, address: u32, value: u32, width: AccessWidth) {
        self.stats.writes += 1;
        let Some(region) = self.regions.lookup(address).copied() else {
            self.stats.unmapped_writes += 1;
            tracing::debug!("unmapped write at {address:#010x} = {value:#x}");
            return;
        };
        let offset = address - region.base;

        match region.target {
            Target::Ram => memory_write(&mut self.ram, offset, value, width),
            Target::Iram => memory_write(&mut self.iram, offset, value, width),
            Target::LowVector => match &mut self.boot {
                Some(boot) => memory_write(boot, offset, value, width),
                None => memory_write(&mut self.ram, offset, value, width),
            },
            Target::Device(id) => {
                self.device_write(id, offset, value, width);
                if id == DeviceId::Dma {
                    self.run_dma();
                }
            }
        }
    }

    fn device_read(&mut self, id: DeviceId, offset: u32, width: AccessWidth) -> u32 {
        tracing::trace!("{id:?} read {offset:#x} ({width:?})");
        if id == DeviceId::InterruptController {
            return read_lane(self.interrupts.read_register(offset & !3), offset, width);
        }

        let mut ctx = IoContext {
            core: self.accessing_core,
            interrupts: &mut self.interrupts,
        };
        match id {
            DeviceId::Lcd => self.lcd.read(offset, width, &mut ctx),
            DeviceId::SystemController => self.system.read(offset, width, &mut ctx),
            DeviceId::ChipInfo => self.system.chip.read(offset, width, &mut ctx),
            DeviceId::Timers => self.timers.read(offset, width, &mut ctx),
            DeviceId::Dma => self.dma.read(offset, width, &mut ctx),
            DeviceId::Cache => self.cache.read(offset, width, &mut ctx),
            DeviceId::CacheFlush => self.cache.flush.read(offset, width, &mut ctx),
            DeviceId::Gpio => self.gpio.read(offset, width, &mut ctx),
            DeviceId::I2s => self.i2s.read(offset, width, &mut ctx),
            DeviceId::I2c => self.i2c.read(offset, width, &mut ctx),
            DeviceId::ClickWheel => self.click_wheel.read(offset, width, &mut ctx),
            DeviceId::Ata => self.ata.read(offset, width, &mut ctx),
            DeviceId::InterruptController => 0,
        }
    }

    fn device_write(&mut self, id: DeviceId, offset: u32, value: u32, width: AccessWidth) {
        tracing::trace!("{id:?} write {offset:#x} = {value:#x} ({width:?})");
        if id == DeviceId::InterruptController {
            let value = match width {
                AccessWidth::Word => value,
                _ if InterruptController::is_read_write(offset) => {
                    let current = self.interrupts.read_register(offset & !3);
                    merge_lane(current, value, offset, width)
                }
                _ => write_lane(value, offset, width),
            };
            self.interrupts.write_register(offset & !3, value);
            return;
        }

        let mut ctx = IoContext {
            core: self.accessing_core,
            interrupts: &mut self.interrupts,
        };
        match id {
            DeviceId::Lcd => self.lcd.write(offset, value, width, &mut ctx),
            DeviceId::SystemController => self.system.write(offset, value, width, &mut ctx),
            DeviceId::ChipInfo => self.system.chip.write(offset, value, width, &mut ctx),
            DeviceId::Timers => self.timers.write(offset, value, width, &mut ctx),
            DeviceId::Dma => self.dma.write(offset, value, width, &mut ctx),
            DeviceId::Cache => self.cache.write(offset, value, width, &mut ctx),
            DeviceId::CacheFlush => self.cache.flush.write(offset, value, width, &mut ctx),
            DeviceId::Gpio => self.gpio.write(offset, value, width, &mut ctx),
            DeviceId::I2s => self.i2s.write(offset, value, width, &mut ctx),
            DeviceId::I2c => self.i2c.write(offset, value, width, &mut ctx),
            DeviceId::ClickWheel => self.click_wheel.write(offset, value, width, &mut ctx),
            DeviceId::Ata => self.ata.write(offset, value, width, &mut ctx),
            DeviceId::InterruptController => {}
        }
    }

    /// Executes queued DMA requests word by word through the bus.
    fn run_dma(&mut self) {
        while let Some(request) = self.dma.take_request() {
            let mut ram_address = request.ram_address;
            for _ in 0..request.words() {
                if request.to_peripheral {
                    let value = self.read_word(ram_address);
                    self.write_word(request.peripheral_address, value);
                } else {
                    let value = self.read_word(request.peripheral_address);
                    self.write_word(ram_address, value);
                }
                ram_address = ram_address.wrapping_add(4);
            }
            self.stats.dma_words += u64::from(request.words());
            self.dma.complete(&request, &mut self.interrupts);
        }
    }
}

fn memory_read(block: &MemoryBlock, offset: u32, width: AccessWidth) -> u32 {
    match width {
        AccessWidth::Byte => u32::from(block.read_byte(offset)),
        AccessWidth::HalfWord => u32::from(block.read_half_word(offset)),
        AccessWidth::Word => block.read_word(offset),
    }
}

fn memory_write(block: &mut MemoryBlock, offset: u32, value: u32, width: AccessWidth) {
    match width {
        AccessWidth::Byte => block.write_byte(offset, value as u8),
        AccessWidth::HalfWord => block.write_half_word(offset, value as u16),
        AccessWidth::Word => block.write_word(offset, value),
    }
}
