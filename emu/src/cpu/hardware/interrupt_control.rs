//! Interrupt controller at `0x6000_4000`.
//!
//! 64 sources split in two identical 32-bit banks: sources 0-31 at +0x000
//! and 32-63 at +0x100. A source is delivered to a core when it is pending
//! (latched or forced) and enabled for that core; the core's priority
//! register routes it to FIQ instead of IRQ.
//!
//! | off  | register         | access                          |
//! |------|------------------|---------------------------------|
//! | 0x00 | CPU_INT_STAT     | pending & cpu_en & !cpu_prio    |
//! | 0x04 | COP_INT_STAT     | pending & cop_en & !cop_prio    |
//! | 0x08 | CPU_FIQ_STAT     | pending & cpu_en & cpu_prio     |
//! | 0x0C | COP_FIQ_STAT     | pending & cop_en & cop_prio     |
//! | 0x10 | INT_STAT         | raw pending                     |
//! | 0x14 | INT_CLR          | w1c latched                     |
//! | 0x20 | CPU_INT_EN_STAT  | r                               |
//! | 0x24 | CPU_INT_EN       | w1s                             |
//! | 0x28 | CPU_INT_DIS      | w1c                             |
//! | 0x2C | CPU_INT_PRIORITY | rw, 1 = FIQ                     |
//! | 0x30 | COP_INT_EN_STAT  | r                               |
//! | 0x34 | COP_INT_EN       | w1s                             |
//! | 0x38 | COP_INT_DIS      | w1c                             |
//! | 0x3C | COP_INT_PRIORITY | rw                              |
//! | 0x40 | INT_FORCED_STAT  | r                               |
//! | 0x44 | INT_FORCED_SET   | w1s                             |
//! | 0x48 | INT_FORCED_CLR   | w1c                             |

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::cpu::hardware::CoreId;

bitflags! {
    /// Interrupt sources, one bit per source number.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InterruptMask: u64 {
        /// Source 0.
        const TIMER1 = 1 << 0;
        /// Source 1.
        const TIMER2 = 1 << 1;
        /// Source 4, inter-core mailbox.
        const MAILBOX = 1 << 4;
        /// Source 10, I2S FIFO.
        const I2S = 1 << 10;
        /// Source 23, ATA channel 0.
        const IDE = 1 << 23;
        /// Source 26.
        const DMA = 1 << 26;
        /// Source 32, GPIO ports A-D.
        const GPIO0 = 1 << 32;
        /// Source 33, GPIO ports E-H.
        const GPIO1 = 1 << 33;
        /// Source 34, GPIO ports I-L.
        const GPIO2 = 1 << 34;
        /// Source 36, serial port 0.
        const SER0 = 1 << 36;
        /// Source 40, I2C and the click wheel.
        const I2C = 1 << 40;

        const _ = !0;
    }
}

pub const CPU_INT_STAT: u32 = 0x00;
pub const COP_INT_STAT: u32 = 0x04;
pub const CPU_FIQ_STAT: u32 = 0x08;
pub const COP_FIQ_STAT: u32 = 0x0C;
pub const INT_STAT: u32 = 0x10;
pub const INT_CLR: u32 = 0x14;
pub const CPU_INT_EN_STAT: u32 = 0x20;
pub const CPU_INT_EN: u32 = 0x24;
pub const CPU_INT_DIS: u32 = 0x28;
pub const CPU_INT_PRIORITY: u32 = 0x2C;
pub const COP_INT_EN_STAT: u32 = 0x30;
pub const COP_INT_EN: u32 = 0x34;
pub const COP_INT_DIS: u32 = 0x38;
pub const COP_INT_PRIORITY: u32 = 0x3C;
pub const INT_FORCED_STAT: u32 = 0x40;
pub const INT_FORCED_SET: u32 = 0x44;
pub const INT_FORCED_CLR: u32 = 0x48;

/// Offset of the high bank (sources 32-63).
const HIGH_BANK: u32 = 0x100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterruptStats {
    pub raised: u64,
    pub cleared: u64,
    pub register_reads: u64,
    pub register_writes: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InterruptController {
    latched: InterruptMask,
    forced: InterruptMask,
    cpu_enable: InterruptMask,
    cop_enable: InterruptMask,
    cpu_priority: InterruptMask,
    cop_priority: InterruptMask,
    #[serde(skip)]
    stats: InterruptStats,
}

impl InterruptController {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Latches `sources` as pending.
    pub fn set_pending(&mut self, sources: InterruptMask) {
        if !self.latched.contains(sources) {
            self.stats.raised += 1;
            tracing::trace!("interrupt raised {sources:?}");
        }
        self.latched.insert(sources);
    }

    pub fn clear_pending(&mut self, sources: InterruptMask) {
        if self.latched.intersects(sources) {
            self.stats.cleared += 1;
        }
        self.latched.remove(sources);
    }

    /// Drives level-sensitive sources: pending while `asserted`.
    pub fn set_level(&mut self, sources: InterruptMask, asserted: bool) {
        if asserted {
            self.set_pending(sources);
        } else {
            self.clear_pending(sources);
        }
    }

    pub fn set_enabled(&mut self, core: CoreId, sources: InterruptMask, on: bool) {
        let enable = match core {
            CoreId::Cpu => &mut self.cpu_enable,
            CoreId::Cop => &mut self.cop_enable,
        };
        enable.set(sources, on);
    }

    /// Latched or forced sources.
    #[must_use]
    pub fn pending(&self) -> InterruptMask {
        self.latched | self.forced
    }

    #[must_use]
    pub fn is_pending(&self, sources: InterruptMask) -> bool {
        self.pending().intersects(sources)
    }

    fn enabled_for(&self, core: CoreId) -> (InterruptMask, InterruptMask) {
        match core {
            CoreId::Cpu => (self.pending() & self.cpu_enable, self.cpu_priority),
            CoreId::Cop => (self.pending() & self.cop_enable, self.cop_priority),
        }
    }

    #[must_use]
    pub fn has_pending_irq(&self, core: CoreId) -> bool {
        let (active, priority) = self.enabled_for(core);
        !(active - priority).is_empty()
    }

    #[must_use]
    pub fn has_pending_fiq(&self, core: CoreId) -> bool {
        let (active, priority) = self.enabled_for(core);
        active.intersects(priority)
    }

    #[must_use]
    pub fn cop_has_pending_irq(&self) -> bool {
        self.has_pending_irq(CoreId::Cop)
    }

    #[must_use]
    pub const fn stats(&self) -> InterruptStats {
        self.stats
    }

    /// Word read of the register at `offset` in either bank.
    pub fn read_register(&mut self, offset: u32) -> u32 {
        self.stats.register_reads += 1;
        let shift = if offset & HIGH_BANK == 0 { 0 } else { 32 };
        let bank = |mask: InterruptMask| (mask.bits() >> shift) as u32;

        match offset & 0xFC {
            CPU_INT_STAT => bank(self.pending() & (self.cpu_enable - self.cpu_priority)),
            COP_INT_STAT => bank(self.pending() & (self.cop_enable - self.cop_priority)),
            CPU_FIQ_STAT => bank(self.pending() & self.cpu_enable & self.cpu_priority),
            COP_FIQ_STAT => bank(self.pending() & self.cop_enable & self.cop_priority),
            INT_STAT => bank(self.pending()),
            CPU_INT_EN_STAT => bank(self.cpu_enable),
            CPU_INT_PRIORITY => bank(self.cpu_priority),
            COP_INT_EN_STAT => bank(self.cop_enable),
            COP_INT_PRIORITY => bank(self.cop_priority),
            INT_FORCED_STAT => bank(self.forced),
            _ => 0,
        }
    }

    /// Registers that hold their value; narrow stores must merge into them.
    #[must_use]
    pub const fn is_read_write(offset: u32) -> bool {
        matches!(offset & 0xFC, CPU_INT_PRIORITY | COP_INT_PRIORITY)
    }

    /// Word write of the register at `offset` in either bank.
    pub fn write_register(&mut self, offset: u32, value: u32) {
        self.stats.register_writes += 1;
        let shift = if offset & HIGH_BANK == 0 { 0 } else { 32 };
        let bits = InterruptMask::from_bits_retain(u64::from(value) << shift);
        let bank_mask = InterruptMask::from_bits_retain(0xFFFF_FFFF_u64 << shift);
        let replace = |target: &mut InterruptMask| *target = (*target - bank_mask) | bits;

        match offset & 0xFC {
            INT_CLR => self.clear_pending(bits),
            CPU_INT_EN => self.cpu_enable.insert(bits),
            CPU_INT_DIS => self.cpu_enable.remove(bits),
            CPU_INT_PRIORITY => replace(&mut self.cpu_priority),
            COP_INT_EN => self.cop_enable.insert(bits),
            COP_INT_DIS => self.cop_enable.remove(bits),
            COP_INT_PRIORITY => replace(&mut self.cop_priority),
            INT_FORCED_SET => self.forced.insert(bits),
            INT_FORCED_CLR => self.forced.remove(bits),
            _ => tracing::debug!("write to read-only interrupt register {offset:#x} = {value:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn source_numbers() {
        assert_eq!(InterruptMask::TIMER1.bits(), 1);
        assert_eq!(InterruptMask::IDE.bits(), 1 << 23);
        assert_eq!(InterruptMask::GPIO0.bits(), 1 << 32);
        assert_eq!(InterruptMask::I2C.bits(), 1 << 40);
    }

    #[test]
    fn pending_needs_enable() {
        let mut ic = InterruptController::default();

        ic.set_pending(InterruptMask::TIMER1);
        assert!(!ic.has_pending_irq(CoreId::Cpu));

        ic.set_enabled(CoreId::Cpu, InterruptMask::TIMER1, true);
        assert!(ic.has_pending_irq(CoreId::Cpu));
        assert!(!ic.has_pending_irq(CoreId::Cop));
        assert!(!ic.has_pending_fiq(CoreId::Cpu));

        ic.clear_pending(InterruptMask::TIMER1);
        assert!(!ic.has_pending_irq(CoreId::Cpu));
    }

    #[test]
    fn priority_routes_to_fiq() {
        let mut ic = InterruptController::default();
        ic.write_register(COP_INT_EN, 1 << 4);
        ic.write_register(COP_INT_PRIORITY, 1 << 4);

        ic.set_pending(InterruptMask::MAILBOX);

        assert!(ic.has_pending_fiq(CoreId::Cop));
        assert!(!ic.cop_has_pending_irq());
        assert_eq!(ic.read_register(COP_FIQ_STAT), 1 << 4);
        assert_eq!(ic.read_register(COP_INT_STAT), 0);
    }

    #[test]
    fn high_bank_registers() {
        let mut ic = InterruptController::default();
        ic.write_register(HIGH_BANK + CPU_INT_EN, 1 << 8);

        ic.set_pending(InterruptMask::I2C);

        assert_eq!(ic.read_register(HIGH_BANK + CPU_INT_STAT), 1 << 8);
        assert_eq!(ic.read_register(CPU_INT_STAT), 0);
        assert_eq!(ic.read_register(HIGH_BANK + INT_STAT), 1 << 8);

        ic.write_register(HIGH_BANK + INT_CLR, 1 << 8);
        assert_eq!(ic.read_register(HIGH_BANK + INT_STAT), 0);
    }

    #[test]
    fn enable_disable_are_write_one() {
        let mut ic = InterruptController::default();

        ic.write_register(CPU_INT_EN, 0b0011);
        ic.write_register(CPU_INT_EN, 0b0100);
        ic.write_register(CPU_INT_DIS, 0b0001);

        assert_eq!(ic.read_register(CPU_INT_EN_STAT), 0b0110);
    }

    #[test]
    fn priority_write_keeps_other_bank() {
        let mut ic = InterruptController::default();

        ic.write_register(CPU_INT_PRIORITY, 0x1);
        ic.write_register(HIGH_BANK + CPU_INT_PRIORITY, 0x2);

        assert_eq!(ic.read_register(CPU_INT_PRIORITY), 0x1);
        assert_eq!(ic.read_register(HIGH_BANK + CPU_INT_PRIORITY), 0x2);
    }

    #[test]
    fn forced_sources_survive_clear() {
        let mut ic = InterruptController::default();
        ic.set_enabled(CoreId::Cpu, InterruptMask::DMA, true);

        ic.write_register(INT_FORCED_SET, 1 << 26);
        ic.write_register(INT_CLR, 1 << 26);
        assert!(ic.has_pending_irq(CoreId::Cpu));
        assert_eq!(ic.read_register(INT_FORCED_STAT), 1 << 26);

        ic.write_register(INT_FORCED_CLR, 1 << 26);
        assert!(!ic.has_pending_irq(CoreId::Cpu));
    }
}
