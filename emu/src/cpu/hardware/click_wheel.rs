//! Click wheel controller at `0x7000_C100`.
//!
//! Each input change latches a packet for firmware and raises source 40.
//!
//! ```text
//!  31  30      22..16    12..8     7..0
//! +---+-------+---------+---------+------+
//! | 1 | touch | position| buttons | 0x1A |
//! +---+-------+---------+---------+------+
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{IoContext, IoDevice};

pub const CTRL: u32 = 0x00;
pub const STATUS: u32 = 0x04;
pub const DATA: u32 = 0x40;

const STATUS_READY: u8 = 26;
const STATUS_ACK: u32 = 0b11 << 26;

const PACKET_BASE: u32 = 0x8000_001A;
const PACKET_TOUCHED: u32 = 0x4000_0000;

/// Positions around the wheel.
pub const WHEEL_POSITIONS: i32 = 96;

bitflags! {
    /// Button bits as they appear in the packet.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Buttons: u32 {
        const SELECT = 0x0100;
        const RIGHT = 0x0200;
        const LEFT = 0x0400;
        const PLAY = 0x0800;
        const MENU = 0x1000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Button {
    Select,
    Right,
    Left,
    Play,
    Menu,
}

impl From<Button> for Buttons {
    fn from(button: Button) -> Self {
        match button {
            Button::Select => Self::SELECT,
            Button::Right => Self::RIGHT,
            Button::Left => Self::LEFT,
            Button::Play => Self::PLAY,
            Button::Menu => Self::MENU,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClickWheelStats {
    pub packets: u64,
    pub acknowledged: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClickWheel {
    control: u32,
    status: u32,
    packet: u32,
    buttons: Buttons,
    touched: bool,
    position: u8,
    #[serde(skip)]
    stats: ClickWheelStats,
}

impl ClickWheel {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> ClickWheelStats {
        self.stats
    }

    #[must_use]
    pub const fn position(&self) -> u8 {
        self.position
    }

    #[must_use]
    pub const fn buttons(&self) -> Buttons {
        self.buttons
    }

    pub fn press_button(&mut self, button: Button, interrupts: &mut InterruptController) {
        self.buttons.insert(button.into());
        self.latch(interrupts);
    }

    pub fn release_button(&mut self, button: Button, interrupts: &mut InterruptController) {
        self.buttons.remove(button.into());
        self.latch(interrupts);
    }

    /// Moves the finger `delta` positions clockwise, wrapping around.
    pub fn rotate(&mut self, delta: i32, interrupts: &mut InterruptController) {
        let position = (i32::from(self.position) + delta).rem_euclid(WHEEL_POSITIONS);
        self.position = position as u8;
        self.touched = true;
        self.latch(interrupts);
    }

    /// Lifts the finger off the wheel.
    pub fn release_touch(&mut self, interrupts: &mut InterruptController) {
        self.touched = false;
        self.latch(interrupts);
    }

    #[must_use]
    pub fn packet(&self) -> u32 {
        let mut packet = PACKET_BASE | self.buttons.bits();
        if self.touched {
            packet |= PACKET_TOUCHED | u32::from(self.position) << 16;
        }
        packet
    }

    fn latch(&mut self, interrupts: &mut InterruptController) {
        self.packet = self.packet();
        self.status.set_bit_on(STATUS_READY);
        self.stats.packets += 1;
        tracing::trace!("click wheel packet {:#010x}", self.packet);
        interrupts.set_pending(InterruptMask::I2C);
    }
}

impl IoDevice for ClickWheel {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            CTRL => self.control,
            STATUS => self.status,
            DATA => self.packet,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>) {
        match offset {
            CTRL => self.control = value,
            STATUS if value & STATUS_ACK != 0 => {
                self.status.set_bit_off(STATUS_READY);
                self.stats.acknowledged += 1;
                ctx.interrupts.clear_pending(InterruptMask::I2C);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::CoreId;
    use pretty_assertions::assert_eq;

    #[test]
    fn button_packet() {
        let mut wheel = ClickWheel::default();
        let mut ic = InterruptController::default();

        wheel.press_button(Button::Menu, &mut ic);
        wheel.press_button(Button::Select, &mut ic);

        assert_eq!(wheel.packet(), 0x8000_111A);
        assert!(ic.is_pending(InterruptMask::I2C));

        wheel.release_button(Button::Menu, &mut ic);
        assert_eq!(wheel.packet(), 0x8000_011A);
    }

    #[test]
    fn rotation_wraps() {
        let mut wheel = ClickWheel::default();
        let mut ic = InterruptController::default();

        wheel.rotate(-1, &mut ic);
        assert_eq!(wheel.position(), 95);
        assert_eq!(wheel.packet(), 0xC05F_001A);

        wheel.rotate(3, &mut ic);
        assert_eq!(wheel.position(), 2);

        wheel.release_touch(&mut ic);
        assert_eq!(wheel.packet(), 0x8000_001A);
    }

    #[test]
    fn status_ack_clears_interrupt() {
        let mut wheel = ClickWheel::default();
        let mut ic = InterruptController::default();
        wheel.press_button(Button::Play, &mut ic);
        wheel.release_button(Button::Play, &mut ic);

        let mut ctx = IoContext {
            core: CoreId::Cpu,
            interrupts: &mut ic,
        };
        assert_eq!(wheel.read_word(STATUS, &mut ctx), 1 << 26);
        assert_eq!(wheel.read_word(DATA, &mut ctx), 0x8000_001A);

        wheel.write_word(STATUS, 1 << 27, &mut ctx);

        assert_eq!(wheel.read_word(STATUS, &mut ctx), 0);
        assert!(!ic.is_pending(InterruptMask::I2C));
    }
}
