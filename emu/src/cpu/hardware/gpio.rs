//! GPIO ports A-L at `0x6000_D000`.
//!
//! Ports are grouped by four (A-D at +0x000, E-H at +0x080, I-L at +0x100).
//! Within a group each register kind sits at a 0x10 stride with one word
//! per port. The window at +0x800 mirrors everything with masked writes:
//! bits 8-15 select which of bits 0-7 are updated.

use serde::{Deserialize, Serialize};

use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{IoContext, IoDevice};

pub const ENABLE: u32 = 0x00;
pub const OUTPUT_EN: u32 = 0x10;
pub const OUTPUT_VAL: u32 = 0x20;
pub const INPUT_VAL: u32 = 0x30;
pub const INT_STAT: u32 = 0x40;
pub const INT_EN: u32 = 0x50;
pub const INT_LEV: u32 = 0x60;
pub const INT_CLR: u32 = 0x70;

const GROUP_STRIDE: u32 = 0x80;
const MASKED_ALIAS: u32 = 0x800;

pub const PORT_COUNT: usize = 12;

/// Hold switch: port A bit 5, low while hold is engaged.
pub const HOLD_SWITCH_PORT: usize = 0;
pub const HOLD_SWITCH_PIN: u8 = 5;

const GROUP_INTERRUPTS: [InterruptMask; 3] =
    [InterruptMask::GPIO0, InterruptMask::GPIO1, InterruptMask::GPIO2];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpioStats {
    pub input_changes: u64,
    pub interrupts_latched: u64,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct Port {
    enable: u8,
    output_enable: u8,
    output_value: u8,
    interrupt_status: u8,
    interrupt_enable: u8,
    interrupt_level: u8,
    /// Level driven from outside the chip.
    external: u8,
}

impl Port {
    const fn input_value(&self) -> u8 {
        (self.output_value & self.output_enable) | (self.external & !self.output_enable)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gpio {
    ports: [Port; PORT_COUNT],
    #[serde(skip)]
    stats: GpioStats,
}

impl Default for Gpio {
    fn default() -> Self {
        Self {
            ports: [Port {
                external: 0xFF,
                ..Port::default()
            }; PORT_COUNT],
            stats: GpioStats::default(),
        }
    }
}

impl Gpio {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> GpioStats {
        self.stats
    }

    /// Current INPUT_VAL of `port`.
    #[must_use]
    pub const fn input_value(&self, port: usize) -> u8 {
        self.ports[port].input_value()
    }

    /// Drives an external pin. A transition to the pin's INT_LEV level
    /// latches INT_STAT.
    pub fn set_input_level(
        &mut self,
        port: usize,
        pin: u8,
        high: bool,
        interrupts: &mut InterruptController,
    ) {
        let Some(state) = self.ports.get_mut(port) else {
            return;
        };
        let bit = 1 << pin;
        let before = state.input_value() & bit;

        if high {
            state.external |= bit;
        } else {
            state.external &= !bit;
        }

        let after = state.input_value() & bit;
        if before != after {
            self.stats.input_changes += 1;
            if after == state.interrupt_level & bit {
                state.interrupt_status |= bit;
                self.stats.interrupts_latched += 1;
            }
            tracing::debug!("gpio port {port} pin {pin} -> {high}");
        }

        self.update_interrupts(interrupts);
    }

    /// Engages (`true`) or releases the hold switch.
    pub fn set_hold_switch(&mut self, hold: bool, interrupts: &mut InterruptController) {
        self.set_input_level(HOLD_SWITCH_PORT, HOLD_SWITCH_PIN, !hold, interrupts);
    }

    fn update_interrupts(&self, interrupts: &mut InterruptController) {
        for (group, ports) in self.ports.chunks(4).enumerate() {
            let active = ports
                .iter()
                .any(|p| p.interrupt_status & p.interrupt_enable != 0);
            interrupts.set_level(GROUP_INTERRUPTS[group], active);
        }
    }

    /// Splits an offset into port index and register kind.
    fn decode(offset: u32) -> Option<(usize, u32)> {
        let offset = offset & !MASKED_ALIAS;
        let group = offset / GROUP_STRIDE;
        if group >= 3 {
            return None;
        }
        let within = offset % GROUP_STRIDE;
        let port = group as usize * 4 + ((within >> 2) & 3) as usize;
        Some((port, within & 0x70))
    }

    fn register(&mut self, port: usize, kind: u32) -> Option<&mut u8> {
        let port = &mut self.ports[port];
        match kind {
            ENABLE => Some(&mut port.enable),
            OUTPUT_EN => Some(&mut port.output_enable),
            OUTPUT_VAL => Some(&mut port.output_value),
            INT_STAT => Some(&mut port.interrupt_status),
            INT_EN => Some(&mut port.interrupt_enable),
            INT_LEV => Some(&mut port.interrupt_level),
            _ => None,
        }
    }
}

impl IoDevice for Gpio {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        let Some((port, kind)) = Self::decode(offset) else {
            return 0;
        };

        match kind {
            INPUT_VAL => u32::from(self.ports[port].input_value()),
            INT_CLR => 0,
            _ => self.register(port, kind).map_or(0, |r| u32::from(*r)),
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>) {
        let Some((port, kind)) = Self::decode(offset) else {
            tracing::debug!("gpio write to unmapped {offset:#x}");
            return;
        };
        let (mask, bits) = if offset & MASKED_ALIAS == 0 {
            (0xFF, value as u8)
        } else {
            ((value >> 8) as u8, value as u8)
        };

        match kind {
            INT_CLR => self.ports[port].interrupt_status &= !(bits & mask),
            INPUT_VAL => {}
            _ => {
                if let Some(register) = self.register(port, kind) {
                    *register = (*register & !mask) | (bits & mask);
                }
            }
        }

        self.update_interrupts(ctx.interrupts);
    }
}
