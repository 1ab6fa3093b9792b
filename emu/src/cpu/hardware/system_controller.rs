//! System controller.
//!
//! Spread over three windows:
//! - `0x6000_0000` processor id and the inter-core mailbox,
//! - `0x6000_6000` device reset/enable, clocks, PLL and the per-core
//!   control registers,
//! - `0x7000_0000` chip identification and device-init scratch ([`ChipInfo`]).
//!
//! The first two share one offset origin at `0x6000_0000`.
//!
//! It also owns the companion core's run state. The primary core starts the
//! COP by clearing PROC_SLEEP in COP_CTL; the request is consumed by the next
//! [`SystemController::tick_cop_state`].
//!
//! ```text
//!             wake request          COP_CTL PROC_SLEEP
//!  Sleeping ---------------> Running -----------------> Sleeping
//!                               ^  |
//!                 set_cop_state |  | set_cop_state
//!                               |  v
//!                              Halted
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::InterruptMask;
use crate::cpu::hardware::{AccessWidth, CoreId, IoContext, IoDevice, merge_lane, write_lane};

pub const PROCESSOR_ID: u32 = 0x0000;
pub const MBX_MSG_STAT: u32 = 0x1000;
pub const MBX_MSG_SET: u32 = 0x1004;
pub const MBX_MSG_CLR: u32 = 0x1008;
pub const DEV_RS: u32 = 0x6004;
pub const DEV_RS2: u32 = 0x6008;
pub const DEV_EN: u32 = 0x600C;
pub const DEV_EN2: u32 = 0x6010;
pub const CLOCK_SOURCE: u32 = 0x6020;
pub const PLL_CONTROL: u32 = 0x6034;
pub const PLL_STATUS: u32 = 0x603C;
pub const CPU_CTL: u32 = 0x7000;
pub const COP_CTL: u32 = 0x7004;

pub const PROC_ID_CPU: u32 = 0x55;
pub const PROC_ID_COP: u32 = 0xAA;

/// CPU_CTL/COP_CTL: the core is asleep.
pub const PROC_SLEEP: u8 = 31;

const PLL_LOCKED: u32 = 1 << 31;

pub const CHIP_ID: u32 = 0x00;
pub const CHIP_REVISION: u32 = 0x04;

/// "PP50" read as a big-endian tag.
const CHIP_ID_VALUE: u32 = 0x5050_3530;
/// "20AF".
const CHIP_REVISION_VALUE: u32 = 0x3230_4146;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopState {
    #[default]
    Sleeping,
    Running,
    Halted,
}

impl std::fmt::Display for CopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sleeping => f.write_str("sleeping"),
            Self::Running => f.write_str("running"),
            Self::Halted => f.write_str("halted"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub mailbox_posts: u64,
    pub cop_wakes: u64,
    pub cop_sleeps: u64,
    pub ignored_wake_requests: u64,
    pub primary_sleeps: u64,
}

/// Chip id words and device-init scratch at `0x7000_0000`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChipInfo {
    scratch: BTreeMap<u32, u32>,
}

impl IoDevice for ChipInfo {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            CHIP_ID => CHIP_ID_VALUE,
            CHIP_REVISION => CHIP_REVISION_VALUE,
            _ => self.scratch.get(&offset).copied().unwrap_or(0),
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        match offset {
            CHIP_ID | CHIP_REVISION => tracing::debug!("write to chip id {offset:#x} dropped"),
            _ => {
                self.scratch.insert(offset, value);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemController {
    pub chip: ChipInfo,
    /// Pending message bits per core, indexed by [`CoreId`].
    inbox: [u32; 2],
    cpu_ctl: u32,
    cop_ctl: u32,
    cop_state: CopState,
    wake_requested: bool,
    cop_enabled: bool,
    primary_sleeping: bool,
    /// Device, clock and unmodelled registers, stored as written.
    registers: BTreeMap<u32, u32>,
    #[serde(skip)]
    stats: SystemStats,
}

impl Default for SystemController {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SystemController {
    #[must_use]
    pub fn new(cop_enabled: bool) -> Self {
        Self {
            chip: ChipInfo::default(),
            inbox: [0; 2],
            cpu_ctl: 0,
            cop_ctl: 1 << PROC_SLEEP,
            cop_state: CopState::Sleeping,
            wake_requested: false,
            cop_enabled,
            primary_sleeping: false,
            registers: BTreeMap::new(),
            stats: SystemStats::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cop_enabled);
    }

    #[must_use]
    pub const fn stats(&self) -> SystemStats {
        self.stats
    }

    #[must_use]
    pub const fn cop_state(&self) -> CopState {
        self.cop_state
    }

    /// Debugger and `init_cop` control over the COP. Clears any pending wake.
    pub fn set_cop_state(&mut self, state: CopState) {
        tracing::info!("cop {} -> {state}", self.cop_state);
        self.cop_state = state;
        self.wake_requested = false;
        self.cop_ctl.set_bit(PROC_SLEEP, state == CopState::Sleeping);
    }

    /// Applies a pending wake request and reports whether the COP may
    /// execute this step.
    pub fn tick_cop_state(&mut self) -> bool {
        if self.wake_requested {
            self.wake_requested = false;
            if self.cop_state == CopState::Sleeping {
                self.cop_state = CopState::Running;
                self.cop_ctl.set_bit_off(PROC_SLEEP);
                self.stats.cop_wakes += 1;
                tracing::info!("cop woken by primary core");
            }
        }

        self.cop_state == CopState::Running
    }

    #[must_use]
    pub const fn primary_sleeping(&self) -> bool {
        self.primary_sleeping
    }

    /// Ends primary sleep once an interrupt is pending for it.
    pub fn wake_primary_on_interrupt(&mut self, interrupt_pending: bool) {
        if self.primary_sleeping && interrupt_pending {
            tracing::debug!("primary core woken by interrupt");
            self.wake_primary();
        }
    }

    fn wake_primary(&mut self) {
        self.primary_sleeping = false;
        self.cpu_ctl.set_bit_off(PROC_SLEEP);
    }

    fn update_mailbox(&self, ctx: &mut IoContext<'_>) {
        ctx.interrupts
            .set_level(InterruptMask::MAILBOX, self.inbox.iter().any(|m| *m != 0));
    }

    fn write_cpu_ctl(&mut self, value: u32, core: CoreId) {
        let sleep = value.is_bit_on(PROC_SLEEP);
        self.cpu_ctl = value;
        match core {
            CoreId::Cpu if sleep => {
                self.primary_sleeping = true;
                self.stats.primary_sleeps += 1;
                tracing::debug!("primary core sleeping");
            }
            CoreId::Cop if !sleep => self.wake_primary(),
            _ => {}
        }
    }

    fn write_cop_ctl(&mut self, value: u32, core: CoreId) {
        if value.is_bit_on(PROC_SLEEP) {
            self.cop_ctl = value;
            if self.cop_state == CopState::Running {
                self.cop_state = CopState::Sleeping;
                self.stats.cop_sleeps += 1;
                tracing::debug!("cop sleeping");
            }
            return;
        }

        self.cop_ctl = value | (self.cop_ctl & (1 << PROC_SLEEP));
        if core == CoreId::Cpu {
            if self.cop_enabled {
                self.wake_requested = true;
            } else {
                self.stats.ignored_wake_requests += 1;
                tracing::debug!("cop wake request ignored, cop disabled");
            }
        }
    }
}

impl IoDevice for SystemController {
    fn read_word(&mut self, offset: u32, ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            PROCESSOR_ID => match ctx.core {
                CoreId::Cpu => PROC_ID_CPU,
                CoreId::Cop => PROC_ID_COP,
            },
            MBX_MSG_STAT => self.inbox[ctx.core as usize],
            MBX_MSG_SET | MBX_MSG_CLR => 0,
            PLL_STATUS => self.registers.get(&offset).copied().unwrap_or(0) | PLL_LOCKED,
            CPU_CTL => self.cpu_ctl,
            COP_CTL => self.cop_ctl,
            _ => self.registers.get(&offset).copied().unwrap_or(0),
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>) {
        match offset {
            PROCESSOR_ID | MBX_MSG_STAT => {}
            MBX_MSG_SET => {
                self.inbox[ctx.core.other() as usize] |= value;
                self.stats.mailbox_posts += 1;
                self.update_mailbox(ctx);
            }
            MBX_MSG_CLR => {
                self.inbox[ctx.core as usize] &= !value;
                self.update_mailbox(ctx);
            }
            CPU_CTL => self.write_cpu_ctl(value, ctx.core),
            COP_CTL => self.write_cop_ctl(value, ctx.core),
            DEV_RS | DEV_RS2 | DEV_EN | DEV_EN2 | CLOCK_SOURCE | PLL_CONTROL => {
                tracing::trace!("system register {offset:#x} = {value:#x}");
                self.registers.insert(offset, value);
            }
            _ => {
                self.registers.insert(offset, value);
            }
        }
    }

    /// Narrow stores keep the other lanes, so a byte write to COP_CTL leaves
    /// PROC_SLEEP alone. Mailbox set/clear stay write-one.
    fn write(&mut self, offset: u32, value: u32, width: AccessWidth, ctx: &mut IoContext<'_>) {
        let aligned = offset & !3;
        let value = match (aligned, width) {
            (_, AccessWidth::Word) => value,
            (MBX_MSG_SET | MBX_MSG_CLR, _) => write_lane(value, offset, width),
            _ => merge_lane(self.read_word(aligned, ctx), value, offset, width),
        };
        self.write_word(aligned, value, ctx);
    }
}
