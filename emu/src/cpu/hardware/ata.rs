//! ATA (IDE channel 0) controller at `0xC300_0000`.
//!
//! A single master device backed by a [`DiskBackend`]. Commands execute
//! synchronously when written; PIO data moves through a one-sector buffer
//! via the DATA register.
//!
//! | off   | read        | write          |
//! |-------|-------------|----------------|
//! | 0x000 | timing 0    | timing 0       |
//! | 0x004 | timing 1    | timing 1       |
//! | 0x028 | IDE_CFG     | IDE_CFG        |
//! | 0x1E0 | DATA        | DATA           |
//! | 0x1E4 | ERROR       | FEATURES       |
//! | 0x1E8 | NSECTOR     | NSECTOR        |
//! | 0x1EC | SECTOR      | SECTOR         |
//! | 0x1F0 | LCYL        | LCYL           |
//! | 0x1F4 | HCYL        | HCYL           |
//! | 0x1F8 | SELECT      | SELECT         |
//! | 0x1FC | STATUS      | COMMAND        |
//! | 0x3F8 | ALT_STATUS  | CONTROL        |
//!
//! Task-file writes keep the previous value as the "high order byte" used by
//! the 48-bit EXT commands.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{AccessWidth, IoContext, IoDevice, read_lane};
use crate::disk::{DiskBackend, SECTOR_SIZE};

pub const TIMING0: u32 = 0x000;
pub const TIMING1: u32 = 0x004;
pub const IDE_CFG: u32 = 0x028;
pub const DATA: u32 = 0x1E0;
pub const ERROR: u32 = 0x1E4;
pub const NSECTOR: u32 = 0x1E8;
pub const SECTOR: u32 = 0x1EC;
pub const LCYL: u32 = 0x1F0;
pub const HCYL: u32 = 0x1F4;
pub const SELECT: u32 = 0x1F8;
pub const COMMAND: u32 = 0x1FC;
pub const CONTROL: u32 = 0x3F8;

pub const FEATURES: u32 = ERROR;
pub const STATUS: u32 = COMMAND;
pub const ALT_STATUS: u32 = CONTROL;

const SELECT_LBA: u8 = 0x40;
const SELECT_DEVICE1: u8 = 0x10;
const CONTROL_NIEN: u8 = 0x02;
const CONTROL_SRST: u8 = 0x04;

/// Largest READ/WRITE MULTIPLE block, advertised in IDENTIFY word 47.
const MAX_MULTIPLE: u8 = 16;

const LBA28_LIMIT: u64 = 0x0FFF_FFFF;

pub mod command {
    pub const READ_SECTORS: u8 = 0x20;
    pub const READ_SECTORS_NO_RETRY: u8 = 0x21;
    pub const READ_SECTORS_EXT: u8 = 0x24;
    pub const WRITE_SECTORS: u8 = 0x30;
    pub const WRITE_SECTORS_NO_RETRY: u8 = 0x31;
    pub const WRITE_SECTORS_EXT: u8 = 0x34;
    pub const INITIALIZE_DEVICE_PARAMETERS: u8 = 0x91;
    pub const READ_MULTIPLE: u8 = 0xC4;
    pub const WRITE_MULTIPLE: u8 = 0xC5;
    pub const SET_MULTIPLE_MODE: u8 = 0xC6;
    pub const STANDBY_IMMEDIATE: u8 = 0xE0;
    pub const IDLE_IMMEDIATE: u8 = 0xE1;
    pub const STANDBY: u8 = 0xE2;
    pub const IDLE: u8 = 0xE3;
    pub const CHECK_POWER_MODE: u8 = 0xE5;
    pub const SLEEP: u8 = 0xE6;
    pub const FLUSH_CACHE: u8 = 0xE7;
    pub const FLUSH_CACHE_EXT: u8 = 0xEA;
    pub const IDENTIFY_DEVICE: u8 = 0xEC;
    pub const SET_FEATURES: u8 = 0xEF;
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AtaStatus: u8 {
        const BSY = 0x80;
        const DRDY = 0x40;
        const DF = 0x20;
        const DSC = 0x10;
        const DRQ = 0x08;
        const ERR = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AtaError: u8 {
        /// Also the "no error" diagnostic code after reset.
        const AMNF = 0x01;
        const ABRT = 0x04;
        const IDNF = 0x10;
        const UNC = 0x40;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtaState {
    #[default]
    Idle,
    Busy,
    /// Device to host PIO.
    DataIn,
    /// Host to device PIO.
    DataOut,
    Error,
    Standby,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AtaStats {
    pub commands: u64,
    pub sectors_read: u64,
    pub sectors_written: u64,
    pub errors: u64,
    pub interrupts: u64,
}

/// A task-file register with its previous value.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct Latched {
    current: u8,
    previous: u8,
}

impl Latched {
    const fn write(&mut self, value: u8) {
        self.previous = self.current;
        self.current = value;
    }

    const fn set(&mut self, value: u8) {
        self.previous = 0;
        self.current = value;
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct TaskFile {
    features: Latched,
    nsector: Latched,
    sector: Latched,
    lcyl: Latched,
    hcyl: Latched,
    select: u8,
}

impl TaskFile {
    fn lba28(&self) -> u64 {
        if self.select & SELECT_LBA == 0 {
            tracing::debug!("CHS addressing requested, treating task file as LBA");
        }
        u64::from(self.select & 0x0F) << 24
            | u64::from(self.hcyl.current) << 16
            | u64::from(self.lcyl.current) << 8
            | u64::from(self.sector.current)
    }

    fn lba48(&self) -> u64 {
        u64::from(self.hcyl.previous) << 40
            | u64::from(self.lcyl.previous) << 32
            | u64::from(self.sector.previous) << 24
            | u64::from(self.hcyl.current) << 16
            | u64::from(self.lcyl.current) << 8
            | u64::from(self.sector.current)
    }

    fn count28(&self) -> u32 {
        match self.nsector.current {
            0 => 256,
            n => u32::from(n),
        }
    }

    fn count48(&self) -> u32 {
        match u32::from(self.nsector.previous) << 8 | u32::from(self.nsector.current) {
            0 => 65536,
            n => n,
        }
    }
}

/// An in-progress PIO transfer.
#[derive(Debug, Default, Clone, Copy)]
struct Transfer {
    lba: u64,
    remaining: u32,
    /// Sectors per DRQ block, one except for READ/WRITE MULTIPLE.
    block_size: u32,
    block_sector: u32,
}

pub struct Ata {
    state: AtaState,
    status: AtaStatus,
    error: AtaError,
    task_file: TaskFile,
    control: u8,
    timing: [u32; 2],
    ide_config: u32,
    buffer: Box<[u8; SECTOR_SIZE]>,
    buffer_pos: usize,
    transfer: Transfer,
    multiple: u8,
    /// INTRQ, before the nIEN mask.
    interrupt_line: bool,
    backend: Option<Box<dyn DiskBackend>>,
    stats: AtaStats,
}

impl std::fmt::Debug for Ata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ata")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("task_file", &self.task_file)
            .field("buffer_pos", &self.buffer_pos)
            .field("transfer", &self.transfer)
            .field("has_backend", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Ata {
    fn default() -> Self {
        Self {
            state: AtaState::Idle,
            status: AtaStatus::DRDY | AtaStatus::DSC,
            error: AtaError::AMNF,
            task_file: TaskFile::default(),
            control: 0,
            timing: [0; 2],
            ide_config: 0,
            buffer: Box::new([0; SECTOR_SIZE]),
            buffer_pos: 0,
            transfer: Transfer::default(),
            multiple: 0,
            interrupt_line: false,
            backend: None,
            stats: AtaStats::default(),
        }
    }
}

impl Ata {
    /// Resets the device, keeping the attached backend.
    pub fn reset(&mut self) {
        let backend = self.backend.take();
        *self = Self {
            backend,
            ..Self::default()
        };
        self.set_signature();
    }

    pub fn attach_backend(&mut self, backend: Box<dyn DiskBackend>) {
        tracing::info!("ata backend attached, {} sectors", backend.sector_count());
        self.backend = Some(backend);
    }

    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub const fn state(&self) -> AtaState {
        self.state
    }

    #[must_use]
    pub const fn status(&self) -> AtaStatus {
        self.status
    }

    #[must_use]
    pub const fn error(&self) -> AtaError {
        self.error
    }

    #[must_use]
    pub const fn stats(&self) -> AtaStats {
        self.stats
    }

    fn sector_count(&self) -> u64 {
        self.backend.as_ref().map_or(0, |b| b.sector_count())
    }

    /// Diagnostic signature left in the task file by a reset.
    const fn set_signature(&mut self) {
        self.error = AtaError::AMNF;
        self.task_file.nsector.set(1);
        self.task_file.sector.set(1);
        self.task_file.lcyl.set(0);
        self.task_file.hcyl.set(0);
    }

    const fn device_selected(&self) -> bool {
        self.task_file.select & SELECT_DEVICE1 == 0
    }

    fn update_interrupt(&self, interrupts: &mut InterruptController) {
        interrupts.set_level(
            InterruptMask::IDE,
            self.interrupt_line && self.control & CONTROL_NIEN == 0,
        );
    }

    fn raise_interrupt(&mut self, interrupts: &mut InterruptController) {
        self.interrupt_line = true;
        self.stats.interrupts += 1;
        self.update_interrupt(interrupts);
    }

    fn ready(&mut self) {
        self.state = AtaState::Idle;
        self.status = AtaStatus::DRDY | AtaStatus::DSC;
    }

    fn abort(&mut self, error: AtaError, interrupts: &mut InterruptController) {
        self.state = AtaState::Error;
        self.error = error;
        self.status = if self.backend.is_some() {
            AtaStatus::DRDY | AtaStatus::DSC | AtaStatus::ERR
        } else {
            AtaStatus::ERR
        };
        self.stats.errors += 1;
        tracing::warn!("ata command aborted: {error:?}");
        self.raise_interrupt(interrupts);
    }

    fn complete(&mut self, interrupts: &mut InterruptController) {
        self.ready();
        self.raise_interrupt(interrupts);
    }

    fn execute(&mut self, opcode: u8, interrupts: &mut InterruptController) {
        use command::*;

        self.stats.commands += 1;
        tracing::debug!("ata command {opcode:#04x}");

        if !self.device_selected() {
            return;
        }
        if self.backend.is_none() {
            self.abort(AtaError::ABRT, interrupts);
            return;
        }

        self.error = AtaError::empty();
        self.interrupt_line = false;
        self.update_interrupt(interrupts);
        let tf = self.task_file;

        match opcode {
            IDENTIFY_DEVICE => {
                let words = identify_block(self.sector_count(), self.multiple);
                for (chunk, word) in self.buffer.chunks_exact_mut(2).zip(words) {
                    chunk.copy_from_slice(&word.to_le_bytes());
                }
                self.buffer_pos = 0;
                self.transfer = Transfer {
                    lba: 0,
                    remaining: 1,
                    block_size: 1,
                    block_sector: 0,
                };
                self.state = AtaState::DataIn;
                self.status = AtaStatus::DRDY | AtaStatus::DSC | AtaStatus::DRQ;
                self.raise_interrupt(interrupts);
            }
            READ_SECTORS | READ_SECTORS_NO_RETRY => {
                self.begin_read(tf.lba28(), tf.count28(), 1, interrupts);
            }
            READ_SECTORS_EXT => self.begin_read(tf.lba48(), tf.count48(), 1, interrupts),
            READ_MULTIPLE => match self.multiple {
                0 => self.abort(AtaError::ABRT, interrupts),
                block => self.begin_read(tf.lba28(), tf.count28(), u32::from(block), interrupts),
            },
            WRITE_SECTORS | WRITE_SECTORS_NO_RETRY => {
                self.begin_write(tf.lba28(), tf.count28(), 1, interrupts);
            }
            WRITE_SECTORS_EXT => self.begin_write(tf.lba48(), tf.count48(), 1, interrupts),
            WRITE_MULTIPLE => match self.multiple {
                0 => self.abort(AtaError::ABRT, interrupts),
                block => self.begin_write(tf.lba28(), tf.count28(), u32::from(block), interrupts),
            },
            SET_MULTIPLE_MODE => {
                let block = tf.nsector.current;
                if block == 0 || (block.is_power_of_two() && block <= MAX_MULTIPLE) {
                    self.multiple = block;
                    self.complete(interrupts);
                } else {
                    self.abort(AtaError::ABRT, interrupts);
                }
            }
            STANDBY_IMMEDIATE | STANDBY | SLEEP => {
                self.complete(interrupts);
                self.state = AtaState::Standby;
            }
            IDLE_IMMEDIATE | IDLE => self.complete(interrupts),
            CHECK_POWER_MODE => {
                let standby = self.state == AtaState::Standby;
                self.task_file.nsector.set(if standby { 0x00 } else { 0xFF });
                self.complete(interrupts);
                if standby {
                    self.state = AtaState::Standby;
                }
            }
            FLUSH_CACHE | FLUSH_CACHE_EXT => {
                let flushed = self.backend.as_mut().map(|b| b.flush());
                match flushed {
                    Some(Ok(())) => self.complete(interrupts),
                    Some(Err(err)) => {
                        tracing::warn!("ata flush failed: {err}");
                        self.abort(AtaError::UNC, interrupts);
                    }
                    None => self.abort(AtaError::ABRT, interrupts),
                }
            }
            SET_FEATURES => {
                tracing::debug!("ata set features {:#04x}", tf.features.current);
                self.complete(interrupts);
            }
            INITIALIZE_DEVICE_PARAMETERS => self.complete(interrupts),
            _ => {
                tracing::warn!("unsupported ata command {opcode:#04x}");
                self.abort(AtaError::ABRT, interrupts);
            }
        }
    }

    fn check_range(&self, lba: u64, count: u32) -> bool {
        lba + u64::from(count) <= self.sector_count()
    }

    fn load_sector(&mut self, lba: u64) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        match backend.read_sector(lba, &mut self.buffer) {
            Ok(()) => {
                self.stats.sectors_read += 1;
                true
            }
            Err(err) => {
                tracing::warn!("ata read of sector {lba} failed: {err}");
                false
            }
        }
    }

    fn store_sector(&mut self, lba: u64) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        match backend.write_sector(lba, &self.buffer) {
            Ok(()) => {
                self.stats.sectors_written += 1;
                true
            }
            Err(err) => {
                tracing::warn!("ata write of sector {lba} failed: {err}");
                false
            }
        }
    }

    fn begin_read(&mut self, lba: u64, count: u32, block_size: u32, interrupts: &mut InterruptController) {
        if !self.check_range(lba, count) {
            self.abort(AtaError::ABRT | AtaError::IDNF, interrupts);
            return;
        }
        if !self.load_sector(lba) {
            self.abort(AtaError::UNC, interrupts);
            return;
        }

        self.transfer = Transfer {
            lba,
            remaining: count,
            block_size,
            block_sector: 0,
        };
        self.buffer_pos = 0;
        self.state = AtaState::DataIn;
        self.status = AtaStatus::DRDY | AtaStatus::DSC | AtaStatus::DRQ;
        self.raise_interrupt(interrupts);
    }

    fn begin_write(&mut self, lba: u64, count: u32, block_size: u32, interrupts: &mut InterruptController) {
        if !self.check_range(lba, count) {
            self.abort(AtaError::ABRT | AtaError::IDNF, interrupts);
            return;
        }

        self.transfer = Transfer {
            lba,
            remaining: count,
            block_size,
            block_sector: 0,
        };
        self.buffer_pos = 0;
        self.state = AtaState::DataOut;
        self.status = AtaStatus::DRDY | AtaStatus::DSC | AtaStatus::DRQ;
    }

    /// The host drained the buffer: move to the next sector or finish.
    fn sector_read(&mut self, interrupts: &mut InterruptController) {
        let transfer = &mut self.transfer;
        transfer.remaining -= 1;
        transfer.lba += 1;
        transfer.block_sector += 1;

        if transfer.remaining == 0 {
            self.ready();
            return;
        }

        let lba = transfer.lba;
        let block_done = transfer.block_sector == transfer.block_size;
        if block_done {
            transfer.block_sector = 0;
        }
        if !self.load_sector(lba) {
            self.abort(AtaError::UNC, interrupts);
            return;
        }
        self.buffer_pos = 0;
        if block_done {
            self.raise_interrupt(interrupts);
        }
    }

    /// The host filled the buffer: commit it and ask for the next one.
    fn sector_written(&mut self, interrupts: &mut InterruptController) {
        if !self.store_sector(self.transfer.lba) {
            self.abort(AtaError::UNC, interrupts);
            return;
        }

        let transfer = &mut self.transfer;
        transfer.remaining -= 1;
        transfer.lba += 1;
        transfer.block_sector += 1;
        self.buffer_pos = 0;

        if transfer.remaining == 0 {
            self.complete(interrupts);
        } else if transfer.block_sector == transfer.block_size {
            transfer.block_sector = 0;
            self.raise_interrupt(interrupts);
        }
    }

    /// Moves one byte device to host.
    pub fn read_data(&mut self, interrupts: &mut InterruptController) -> u8 {
        if self.state != AtaState::DataIn {
            return 0;
        }
        let value = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        if self.buffer_pos == SECTOR_SIZE {
            self.sector_read(interrupts);
        }
        value
    }

    /// Moves one 16-bit word device to host.
    pub fn read_data_word(&mut self, interrupts: &mut InterruptController) -> u16 {
        let low = self.read_data(interrupts);
        let high = self.read_data(interrupts);
        u16::from_le_bytes([low, high])
    }

    /// Moves one byte host to device.
    pub fn write_data(&mut self, value: u8, interrupts: &mut InterruptController) {
        if self.state != AtaState::DataOut {
            return;
        }
        self.buffer[self.buffer_pos] = value;
        self.buffer_pos += 1;
        if self.buffer_pos == SECTOR_SIZE {
            self.sector_written(interrupts);
        }
    }

    /// Moves one 16-bit word host to device.
    pub fn write_data_word(&mut self, value: u16, interrupts: &mut InterruptController) {
        let [low, high] = value.to_le_bytes();
        self.write_data(low, interrupts);
        self.write_data(high, interrupts);
    }

    fn read_status(&self) -> u32 {
        if self.device_selected() {
            u32::from(self.status.bits())
        } else {
            0
        }
    }

    fn write_control(&mut self, value: u8, interrupts: &mut InterruptController) {
        let was_reset = self.control & CONTROL_SRST != 0;
        self.control = value;

        if value & CONTROL_SRST != 0 {
            self.state = AtaState::Busy;
            self.status = AtaStatus::BSY;
            self.interrupt_line = false;
        } else if was_reset {
            tracing::debug!("ata software reset");
            self.ready();
            self.set_signature();
            self.buffer_pos = 0;
        }
        self.update_interrupt(interrupts);
    }
}

impl IoDevice for Ata {
    fn read_word(&mut self, offset: u32, ctx: &mut IoContext<'_>) -> u32 {
        let tf = &self.task_file;
        match offset {
            TIMING0 => self.timing[0],
            TIMING1 => self.timing[1],
            IDE_CFG => self.ide_config,
            DATA => {
                let low = self.read_data_word(ctx.interrupts);
                let high = self.read_data_word(ctx.interrupts);
                u32::from(high) << 16 | u32::from(low)
            }
            ERROR => u32::from(self.error.bits()),
            NSECTOR => u32::from(tf.nsector.current),
            SECTOR => u32::from(tf.sector.current),
            LCYL => u32::from(tf.lcyl.current),
            HCYL => u32::from(tf.hcyl.current),
            SELECT => u32::from(tf.select),
            STATUS => {
                self.interrupt_line = false;
                self.update_interrupt(ctx.interrupts);
                self.read_status()
            }
            ALT_STATUS => self.read_status(),
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>) {
        let byte = value as u8;
        let tf = &mut self.task_file;
        match offset {
            TIMING0 => self.timing[0] = value,
            TIMING1 => self.timing[1] = value,
            IDE_CFG => self.ide_config = value,
            DATA => {
                self.write_data_word(value as u16, ctx.interrupts);
                self.write_data_word((value >> 16) as u16, ctx.interrupts);
            }
            FEATURES => tf.features.write(byte),
            NSECTOR => tf.nsector.write(byte),
            SECTOR => tf.sector.write(byte),
            LCYL => tf.lcyl.write(byte),
            HCYL => tf.hcyl.write(byte),
            SELECT => tf.select = byte,
            COMMAND => self.execute(byte, ctx.interrupts),
            CONTROL => self.write_control(byte, ctx.interrupts),
            _ => tracing::debug!("ata write to {offset:#x} ignored"),
        }
    }

    fn read(&mut self, offset: u32, width: AccessWidth, ctx: &mut IoContext<'_>) -> u32 {
        match (offset, width) {
            (DATA, AccessWidth::Byte) => u32::from(self.read_data(ctx.interrupts)),
            (DATA, AccessWidth::HalfWord) => u32::from(self.read_data_word(ctx.interrupts)),
            _ => read_lane(self.read_word(offset & !3, ctx), offset, width),
        }
    }

    fn write(&mut self, offset: u32, value: u32, width: AccessWidth, ctx: &mut IoContext<'_>) {
        match (offset, width) {
            (DATA, AccessWidth::Byte) => self.write_data(value as u8, ctx.interrupts),
            (DATA, AccessWidth::HalfWord) => self.write_data_word(value as u16, ctx.interrupts),
            _ if offset & 3 == 0 => self.write_word(offset, value, ctx),
            _ => tracing::debug!("unaligned ata register write at {offset:#x}"),
        }
    }
}

/// Packs an ATA string: two characters per word, first in the high byte,
/// space padded.
fn put_string(words: &mut [u16], text: &str) {
    let mut bytes = text.bytes().chain(std::iter::repeat(b' '));
    for word in words {
        let high = bytes.next().unwrap_or(b' ');
        let low = bytes.next().unwrap_or(b' ');
        *word = u16::from(high) << 8 | u16::from(low);
    }
}

/// Builds the 256-word IDENTIFY DEVICE block for a disk of `sectors`.
#[must_use]
pub fn identify_block(sectors: u64, multiple: u8) -> [u16; 256] {
    const HEADS: u64 = 16;
    const SECTORS_PER_TRACK: u64 = 63;

    let mut words = [0u16; 256];
    let cylinders = (sectors / (HEADS * SECTORS_PER_TRACK)).clamp(1, 16383);
    let lba28 = sectors.min(LBA28_LIMIT) as u32;
    let chs_capacity = (cylinders * HEADS * SECTORS_PER_TRACK) as u32;

    words[0] = 0x0040;
    words[1] = cylinders as u16;
    words[3] = HEADS as u16;
    words[6] = SECTORS_PER_TRACK as u16;
    put_string(&mut words[10..20], "PML0000000000001");
    put_string(&mut words[23..27], "1.0");
    put_string(&mut words[27..47], "POMELO VIRTUAL DISK");
    words[47] = 0x8000 | u16::from(MAX_MULTIPLE);
    words[49] = 0x0300;
    words[53] = 0x0006;
    words[54] = cylinders as u16;
    words[55] = HEADS as u16;
    words[56] = SECTORS_PER_TRACK as u16;
    words[57] = chs_capacity as u16;
    words[58] = (chs_capacity >> 16) as u16;
    words[59] = if multiple == 0 { 0 } else { 0x0100 | u16::from(multiple) };
    words[60] = lba28 as u16;
    words[61] = (lba28 >> 16) as u16;
    words[64] = 0x0003;
    words[80] = 0x007E;
    words[83] = 0x7400;
    words[86] = 0x3400;
    for (idx, word) in words[100..104].iter_mut().enumerate() {
        *word = (sectors >> (16 * idx)) as u16;
    }

    words[255] = 0x00A5;
    let sum = words[..255]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .chain([0xA5])
        .fold(0u8, u8::wrapping_add);
    words[255] |= u16::from(sum.wrapping_neg()) << 8;

    words
}
