//! Cache controller stub at `0x6000_C000` and the flush window at
//! `0xF000_0000`.
//!
//! Caches are not modelled. Every operation completes immediately, so the
//! busy bit never reads set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::{IoContext, IoDevice};

pub const CACHE_CTL: u32 = 0x0000;

const CACHE_CTL_BUSY: u8 = 15;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub control_writes: u64,
    pub flush_writes: u64,
}

/// Writes anywhere in the window request a flush or invalidate.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FlushWindow {
    writes: u64,
}

impl IoDevice for FlushWindow {
    fn read_word(&mut self, _offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        0
    }

    fn write_word(&mut self, offset: u32, _value: u32, _ctx: &mut IoContext<'_>) {
        self.writes += 1;
        tracing::trace!("cache flush request at {offset:#x}");
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheController {
    pub flush: FlushWindow,
    control: u32,
    registers: BTreeMap<u32, u32>,
    control_writes: u64,
}

impl CacheController {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        CacheStats {
            control_writes: self.control_writes,
            flush_writes: self.flush.writes,
        }
    }
}

impl IoDevice for CacheController {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            CACHE_CTL => self.control,
            _ => self.registers.get(&offset).copied().unwrap_or(0),
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        match offset {
            CACHE_CTL => {
                let mut value = value;
                value.set_bit_off(CACHE_CTL_BUSY);
                self.control = value;
                self.control_writes += 1;
                tracing::debug!("cache control {value:#x}");
            }
            _ => {
                self.registers.insert(offset, value);
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

    #[test]
    fn control_never_busy() {
        let mut cache = CacheController::default();
        let mut ic = InterruptController::default();
        let mut ctx = IoContext {
            core: CoreId::Cpu,
            interrupts: &mut ic,
        };

        cache.write_word(CACHE_CTL, 0x8006, &mut ctx);
        cache.write_word(0x24, 0xABCD, &mut ctx);

        assert_eq!(cache.read_word(CACHE_CTL, &mut ctx), 0x0006);
        assert_eq!(cache.read_word(0x24, &mut ctx), 0xABCD);
    }

    #[test]
    fn flush_window_counts_writes() {
        let mut cache = CacheController::default();
        let mut ic = InterruptController::default();
        let mut ctx = IoContext {
            core: CoreId::Cop,
            interrupts: &mut ic,
        };

        cache.flush.write_word(0x4, 1, &mut ctx);
        cache.flush.write_word(0x8, 1, &mut ctx);

        assert_eq!(cache.flush.read_word(0x4, &mut ctx), 0);
        assert_eq!(cache.stats().flush_writes, 2);
    }
}
