//! I2C controller at `0x7000_C000` with its attached devices.
//!
//! Transfers run synchronously when CTRL is written with SEND set, so the
//! busy bit never reads set.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::bitwise::Bits;
use crate::cpu::hardware::{IoContext, IoDevice};

pub const CTRL: u32 = 0x00;
pub const ADDR: u32 = 0x04;
pub const DATA0: u32 = 0x0C;
pub const DATA3: u32 = 0x18;
pub const STATUS: u32 = 0x1C;

const CTRL_SEND: u8 = 7;
const STATUS_NAK: u8 = 5;

pub const CODEC_ADDRESS: u8 = 0x1A;
pub const PMU_ADDRESS: u8 = 0x08;

/// Headphone volume registers.
pub const LOUT1VOL: usize = 0x34;
pub const ROUT1VOL: usize = 0x35;

/// Volume step that means 0 dB; each step is 1 dB.
const VOLUME_0DB: u16 = 57;
const VOLUME_MUTE: u8 = 6;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct I2cStats {
    pub transfers: u64,
    pub naks: u64,
}

/// Audio codec with 9-bit registers written as two bytes:
/// `[reg << 1 | value bit 8, value bits 0-7]`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codec {
    #[serde_as(as = "[_; 64]")]
    registers: [u16; 64],
}

impl Default for Codec {
    fn default() -> Self {
        let mut registers = [0; 64];
        registers[LOUT1VOL] = VOLUME_0DB;
        registers[ROUT1VOL] = VOLUME_0DB;
        Self { registers }
    }
}

impl Codec {
    fn write(&mut self, bytes: &[u8]) {
        let &[first, second, ..] = bytes else {
            tracing::debug!("short codec write {bytes:?}");
            return;
        };
        let register = usize::from(first >> 1);
        let value = u16::from(first & 1) << 8 | u16::from(second);
        tracing::debug!("codec register {register:#04x} = {value:#05x}");
        if let Some(slot) = self.registers.get_mut(register) {
            *slot = value;
        }
    }

    #[must_use]
    pub fn register(&self, register: usize) -> u16 {
        self.registers.get(register).copied().unwrap_or(0)
    }

    fn channel_gain(&self, register: usize) -> f32 {
        let value = self.register(register);
        if value.is_bit_on(VOLUME_MUTE) {
            return 0.0;
        }
        let steps = f32::from(value & 0x3F) - f32::from(VOLUME_0DB);
        10f32.powf(steps / 20.0)
    }

    /// Linear headphone gain per channel, `(left, right)`.
    #[must_use]
    pub fn headphone_gain(&self) -> (f32, f32) {
        (self.channel_gain(LOUT1VOL), self.channel_gain(ROUT1VOL))
    }
}

/// Power management unit: a 256-byte register file. The first byte of a
/// write selects the register, further bytes store with auto-increment.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pmu {
    #[serde_as(as = "Box<[_; 256]>")]
    registers: Box<[u8; 256]>,
    index: u8,
}

impl Default for Pmu {
    fn default() -> Self {
        Self {
            registers: Box::new([0; 256]),
            index: 0,
        }
    }
}

impl Pmu {
    fn write(&mut self, bytes: &[u8]) {
        let Some((&index, values)) = bytes.split_first() else {
            return;
        };
        self.index = index;
        for value in values {
            self.registers[usize::from(self.index)] = *value;
            self.index = self.index.wrapping_add(1);
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        for byte in buffer {
            *byte = self.registers[usize::from(self.index)];
            self.index = self.index.wrapping_add(1);
        }
    }

    #[must_use]
    pub fn register(&self, index: u8) -> u8 {
        self.registers[usize::from(index)]
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct I2c {
    pub codec: Codec,
    pub pmu: Pmu,
    control: u32,
    address: u32,
    data: [u8; 4],
    status: u32,
    #[serde(skip)]
    stats: I2cStats,
}

impl I2c {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> I2cStats {
        self.stats
    }

    fn transfer(&mut self) {
        let device = (self.address >> 1) as u8 & 0x7F;
        let read = self.address.is_bit_on(0);
        let count = self.control.get_bits(1..=2) as usize + 1;

        self.stats.transfers += 1;
        self.status.set_bit_off(STATUS_NAK);

        match (device, read) {
            (CODEC_ADDRESS, false) => self.codec.write(&self.data[..count]),
            (PMU_ADDRESS, false) => self.pmu.write(&self.data[..count]),
            (PMU_ADDRESS, true) => self.pmu.read(&mut self.data[..count]),
            _ => {
                self.stats.naks += 1;
                self.status.set_bit_on(STATUS_NAK);
                tracing::debug!("i2c nak from {device:#04x} (read: {read})");
            }
        }
    }
}

impl IoDevice for I2c {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            CTRL => self.control,
            ADDR => self.address,
            DATA0..=DATA3 => u32::from(self.data[((offset - DATA0) / 4) as usize]),
            STATUS => self.status,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        match offset {
            CTRL => {
                self.control = value;
                if value.is_bit_on(CTRL_SEND) {
                    self.transfer();
                    self.control.set_bit_off(CTRL_SEND);
                }
            }
            ADDR => self.address = value,
            DATA0..=DATA3 => self.data[((offset - DATA0) / 4) as usize] = value as u8,
            _ => {}
        }
    }
}
