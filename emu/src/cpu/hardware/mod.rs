//! On-chip peripherals.
//!
//! Every controller owns its register state and is reached by the bus
//! through [`IoDevice`] with an offset relative to its window base. Cross
//! wiring (raising interrupts, reading the codec volume) is done through
//! references handed in at call time, never stored.

use serde::{Deserialize, Serialize};

use self::interrupt_control::InterruptController;

pub mod ata;
pub mod cache;
pub mod click_wheel;
pub mod dma;
pub mod gpio;
pub mod i2c;
pub mod i2s;
pub mod internal_memory;
pub mod interrupt_control;
pub mod lcd;
pub mod system_controller;
pub mod timers;

/// Size of a bus access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessWidth {
    Byte,
    HalfWord,
    Word,
}

impl AccessWidth {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
        }
    }

    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::HalfWord => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
        }
    }
}

/// Which core issued an access. Some registers answer from the caller's view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreId {
    #[default]
    Cpu,
    Cop,
}

impl CoreId {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Cpu => Self::Cop,
            Self::Cop => Self::Cpu,
        }
    }
}

/// What a peripheral may touch while handling an access.
pub struct IoContext<'a> {
    pub core: CoreId,
    pub interrupts: &'a mut InterruptController,
}

/// Extracts the lane addressed by `offset` from a register word.
#[must_use]
pub const fn read_lane(word: u32, offset: u32, width: AccessWidth) -> u32 {
    (word >> ((offset & 3) * 8)) & width.mask()
}

/// Places a narrow value in its lane; other lanes are zero.
#[must_use]
pub const fn write_lane(value: u32, offset: u32, width: AccessWidth) -> u32 {
    (value & width.mask()) << ((offset & 3) * 8)
}

/// Replaces the lane addressed by `offset` inside `word`.
#[must_use]
pub const fn merge_lane(word: u32, value: u32, offset: u32, width: AccessWidth) -> u32 {
    let shift = (offset & 3) * 8;
    let mask = width.mask() << shift;
    (word & !mask) | ((value << shift) & mask)
}

/// A memory mapped register block.
///
/// Implementors provide word access; narrow accesses default to lane
/// extraction on reads and a lane-shifted word write. Registers where a
/// narrow write must not disturb the other lanes override [`IoDevice::write`].
pub trait IoDevice {
    fn read_word(&mut self, offset: u32, ctx: &mut IoContext<'_>) -> u32;

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>);

    fn read(&mut self, offset: u32, width: AccessWidth, ctx: &mut IoContext<'_>) -> u32 {
        read_lane(self.read_word(offset & !3, ctx), offset, width)
    }

    fn write(&mut self, offset: u32, value: u32, width: AccessWidth, ctx: &mut IoContext<'_>) {
        match width {
            AccessWidth::Word => self.write_word(offset & !3, value, ctx),
            _ => self.write_word(offset & !3, write_lane(value, offset, width), ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lanes() {
        assert_eq!(read_lane(0x1122_3344, 1, AccessWidth::Byte), 0x33);
        assert_eq!(read_lane(0x1122_3344, 2, AccessWidth::HalfWord), 0x1122);
        assert_eq!(write_lane(0xAB, 3, AccessWidth::Byte), 0xAB00_0000);
        assert_eq!(merge_lane(0x1122_3344, 0xBEEF, 2, AccessWidth::HalfWord), 0xBEEF_3344);
        assert_eq!(merge_lane(0x1122_3344, 0x55, 0, AccessWidth::Word), 0x55);
    }

    #[test]
    fn core_ids() {
        assert_eq!(CoreId::default(), CoreId::Cpu);
        assert_eq!(CoreId::Cpu.other(), CoreId::Cop);
    }
}
