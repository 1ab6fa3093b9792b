//! LCD bridge at `0x3000_0000`.
//!
//! The CPU reaches the display controller's own address space through an
//! address/data port pair. Writes to DATA go to the bridge address in
//! WR_ADDR and advance it by the access size; reads come from RD_ADDR.
//!
//! ```text
//!  CPU window                      bridge address space
//! +0x00000  DATA     ----+        0x00000 - 0x001F7  scratch SRAM
//! +0x10000  WR_ADDR      |        0x001F8            COMMAND (present)
//! +0x20000  RD_ADDR      +------> 0x001FC            STATUS (0 = idle)
//! +0x30000  CONTROL               0xE0000 - 0xE001F  command params
//!                                 0xE0020 - ...      framebuffer 320x240
//! ```
//!
//! Pixels are RGB565. A write to COMMAND copies the back buffer into the
//! presented frame returned by [`Lcd::framebuffer`].

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::{AccessWidth, IoContext, IoDevice, merge_lane, read_lane};

/// Panel width in pixels.
pub const LCD_WIDTH: usize = 320;

/// Panel height in pixels.
pub const LCD_HEIGHT: usize = 240;

pub const DATA: u32 = 0x0_0000;
pub const WR_ADDR: u32 = 0x1_0000;
pub const RD_ADDR: u32 = 0x2_0000;
pub const CONTROL: u32 = 0x3_0000;

const CONTROL_READY: u8 = 1;

const SCRATCH_END: u32 = 0x1F8;
const BRIDGE_COMMAND: u32 = 0x1F8;
const BRIDGE_STATUS: u32 = 0x1FC;
const PARAMS_BASE: u32 = 0xE_0000;
const PARAMS_LEN: u32 = 0x20;
const FRAMEBUFFER_BASE: u32 = 0xE_0020;
const FRAMEBUFFER_BYTES: u32 = (LCD_WIDTH * LCD_HEIGHT * 2) as u32;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u16);

impl Color {
    #[must_use]
    pub fn red(&self) -> u8 {
        self.0.get_bits(11..=15) as u8
    }

    #[must_use]
    pub fn green(&self) -> u8 {
        self.0.get_bits(5..=10) as u8
    }

    #[must_use]
    pub fn blue(&self) -> u8 {
        self.0.get_bits(0..=4) as u8
    }

    /// Expands to 8 bits per channel, replicating the high bits.
    #[must_use]
    pub fn to_rgb888(&self) -> [u8; 3] {
        let (r, g, b) = (self.red(), self.green(), self.blue());
        [r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2]
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LcdStats {
    pub frames_presented: u64,
    pub pixel_writes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lcd {
    control: u32,
    write_address: u32,
    read_address: u32,
    scratch: Vec<u16>,
    params: Vec<u16>,
    back_buffer: Vec<u16>,
    front_buffer: Vec<Color>,
    #[serde(skip)]
    stats: LcdStats,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            control: 0,
            write_address: 0,
            read_address: 0,
            scratch: vec![0; SCRATCH_END as usize / 2],
            params: vec![0; PARAMS_LEN as usize / 2],
            back_buffer: vec![0; LCD_WIDTH * LCD_HEIGHT],
            front_buffer: vec![Color::default(); LCD_WIDTH * LCD_HEIGHT],
            stats: LcdStats::default(),
        }
    }
}

impl Lcd {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> LcdStats {
        self.stats
    }

    /// Last presented frame, row major.
    #[must_use]
    pub fn framebuffer(&self) -> &[Color] {
        &self.front_buffer
    }

    fn present(&mut self) {
        for (front, back) in self.front_buffer.iter_mut().zip(&self.back_buffer) {
            *front = Color(*back);
        }
        self.stats.frames_presented += 1;
        tracing::trace!("lcd frame {} presented", self.stats.frames_presented);
    }

    fn bridge_slot(&mut self, address: u32) -> Option<&mut u16> {
        let address = address & !1;
        match address {
            0..SCRATCH_END => self.scratch.get_mut((address / 2) as usize),
            PARAMS_BASE..FRAMEBUFFER_BASE => {
                self.params.get_mut(((address - PARAMS_BASE) / 2) as usize)
            }
            _ if (FRAMEBUFFER_BASE..FRAMEBUFFER_BASE + FRAMEBUFFER_BYTES).contains(&address) => {
                self.back_buffer
                    .get_mut(((address - FRAMEBUFFER_BASE) / 2) as usize)
            }
            _ => None,
        }
    }

    fn bridge_write(&mut self, address: u32, value: u16) {
        match address & !1 {
            BRIDGE_COMMAND => self.present(),
            BRIDGE_STATUS => {}
            FRAMEBUFFER_BASE.. => {
                if let Some(slot) = self.bridge_slot(address) {
                    *slot = value;
                    self.stats.pixel_writes += 1;
                }
            }
            _ => {
                if let Some(slot) = self.bridge_slot(address) {
                    *slot = value;
                }
            }
        }
    }

    fn bridge_read(&mut self, address: u32) -> u16 {
        match address & !1 {
            BRIDGE_STATUS => 0,
            _ => self.bridge_slot(address).map_or(0, |slot| *slot),
        }
    }

    fn write_data(&mut self, value: u32, width: AccessWidth) {
        let address = self.write_address;
        self.bridge_write(address, value as u16);
        if width == AccessWidth::Word {
            self.bridge_write(address.wrapping_add(2), (value >> 16) as u16);
            self.write_address = address.wrapping_add(4);
        } else {
            self.write_address = address.wrapping_add(2);
        }
    }

    fn read_data(&mut self, width: AccessWidth) -> u32 {
        let address = self.read_address;
        let low = u32::from(self.bridge_read(address));
        if width == AccessWidth::Word {
            let high = u32::from(self.bridge_read(address.wrapping_add(2)));
            self.read_address = address.wrapping_add(4);
            high << 16 | low
        } else {
            self.read_address = address.wrapping_add(2);
            low
        }
    }
}

impl IoDevice for Lcd {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            DATA => self.read_data(AccessWidth::Word),
            WR_ADDR => self.write_address,
            RD_ADDR => self.read_address,
            CONTROL => {
                let mut control = self.control;
                control.set_bit_on(CONTROL_READY);
                control
            }
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        match offset {
            DATA => self.write_data(value, AccessWidth::Word),
            WR_ADDR => self.write_address = value,
            RD_ADDR => self.read_address = value,
            CONTROL => self.control = value,
            _ => tracing::debug!("lcd write to {offset:#x} ignored"),
        }
    }

    fn read(&mut self, offset: u32, width: AccessWidth, ctx: &mut IoContext<'_>) -> u32 {
        match (offset & !3, width) {
            (DATA, AccessWidth::Byte | AccessWidth::HalfWord) => {
                self.read_data(AccessWidth::HalfWord) & width.mask()
            }
            _ => read_lane(self.read_word(offset & !3, ctx), offset, width),
        }
    }

    fn write(&mut self, offset: u32, value: u32, width: AccessWidth, ctx: &mut IoContext<'_>) {
        match (offset & !3, width) {
            (DATA, AccessWidth::Byte | AccessWidth::HalfWord) => {
                self.write_data(value & width.mask(), AccessWidth::HalfWord);
            }
            (_, AccessWidth::Word) => self.write_word(offset & !3, value, ctx),
            _ => {
                let current = self.read_word(offset & !3, ctx);
                let merged = merge_lane(current, value, offset, width);
                self.write_word(offset & !3, merged, ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::interrupt_control::InterruptController;
    use crate::cpu::hardware::CoreId;
    use pretty_assertions::assert_eq;

    fn ctx(interrupts: &mut InterruptController) -> IoContext<'_> {
        IoContext {
            core: CoreId::Cpu,
            interrupts,
        }
    }

    #[test]
    fn control_always_ready() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptController::default();

        assert_eq!(lcd.read_word(CONTROL, &mut ctx(&mut ic)), 0b10);
    }

    #[test]
    fn pixels_show_after_present() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptController::default();

        lcd.write_word(WR_ADDR, FRAMEBUFFER_BASE, &mut ctx(&mut ic));
        lcd.write(DATA, 0xF800, AccessWidth::HalfWord, &mut ctx(&mut ic));
        lcd.write_word(DATA, 0x001F_07E0, &mut ctx(&mut ic));
        assert_eq!(lcd.read_word(WR_ADDR, &mut ctx(&mut ic)), FRAMEBUFFER_BASE + 6);
        assert_eq!(lcd.framebuffer()[0], Color(0));

        lcd.write_word(WR_ADDR, BRIDGE_COMMAND, &mut ctx(&mut ic));
        lcd.write(DATA, 0, AccessWidth::HalfWord, &mut ctx(&mut ic));

        assert_eq!(
            lcd.framebuffer()[..3].to_vec(),
            vec![Color(0xF800), Color(0x07E0), Color(0x001F)]
        );
        assert_eq!(lcd.stats().frames_presented, 1);
        assert_eq!(lcd.stats().pixel_writes, 3);
    }

    #[test]
    fn scratch_and_params_read_back() {
        let mut lcd = Lcd::default();
        let mut ic = InterruptController::default();

        lcd.write_word(WR_ADDR, 0x10, &mut ctx(&mut ic));
        lcd.write_word(DATA, 0xBEEF_CAFE, &mut ctx(&mut ic));
        lcd.write_word(WR_ADDR, PARAMS_BASE, &mut ctx(&mut ic));
        lcd.write(DATA, 0x1234, AccessWidth::HalfWord, &mut ctx(&mut ic));

        lcd.write_word(RD_ADDR, 0x10, &mut ctx(&mut ic));
        assert_eq!(lcd.read(DATA, AccessWidth::HalfWord, &mut ctx(&mut ic)), 0xCAFE);
        assert_eq!(lcd.read(DATA, AccessWidth::HalfWord, &mut ctx(&mut ic)), 0xBEEF);

        lcd.write_word(RD_ADDR, PARAMS_BASE, &mut ctx(&mut ic));
        assert_eq!(lcd.read_word(DATA, &mut ctx(&mut ic)), 0x1234);

        lcd.write_word(RD_ADDR, BRIDGE_STATUS, &mut ctx(&mut ic));
        assert_eq!(lcd.read(DATA, AccessWidth::HalfWord, &mut ctx(&mut ic)), 0);
    }

    #[test]
    fn color_expansion() {
        assert_eq!(Color(0xFFFF).to_rgb888(), [0xFF, 0xFF, 0xFF]);
        assert_eq!(Color(0xF800).to_rgb888(), [0xFF, 0, 0]);
        assert_eq!(Color(0x07E0).green(), 0x3F);
    }
}
