//! DMA engine at `0x6000_A000`.
//!
//! The engine only records requests: a CMD write with START queues a
//! [`DmaRequest`] which the bus executes right after the write returns,
//! since moving data needs the whole address space. The bus then calls
//! [`Dma::complete`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{IoContext, IoDevice};

pub const MASTER_CONTROL: u32 = 0x00;
pub const MASTER_STATUS: u32 = 0x04;
pub const REQ_STATUS: u32 = 0x08;

const CHANNEL_BASE: u32 = 0x1000;
const CHANNEL_STRIDE: u32 = 0x20;
pub const CHANNEL_COUNT: usize = 4;

pub const CMD: u32 = 0x00;
pub const STATUS: u32 = 0x04;
pub const RAM_ADDR: u32 = 0x10;
pub const FLAGS: u32 = 0x14;
pub const PER_ADDR: u32 = 0x18;
pub const INCR: u32 = 0x1C;

const CMD_START: u8 = 31;
const CMD_INTERRUPT: u8 = 30;
const CMD_RAM_TO_PERIPHERAL: u8 = 27;
const STATUS_DONE: u8 = 30;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DmaStats {
    pub transfers: u64,
    pub bytes: u64,
}

/// A transfer waiting for the bus. The RAM side increments, the peripheral
/// side stays fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaRequest {
    pub channel: usize,
    pub ram_address: u32,
    pub peripheral_address: u32,
    pub length: u32,
    pub to_peripheral: bool,
}

impl DmaRequest {
    #[must_use]
    pub const fn words(&self) -> u32 {
        self.length.div_ceil(4)
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct Channel {
    command: u32,
    status: u32,
    ram_address: u32,
    flags: u32,
    peripheral_address: u32,
    increment: u32,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Dma {
    control: u32,
    channels: [Channel; CHANNEL_COUNT],
    queue: VecDeque<DmaRequest>,
    #[serde(skip)]
    stats: DmaStats,
}

impl Dma {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> DmaStats {
        self.stats
    }

    pub fn take_request(&mut self) -> Option<DmaRequest> {
        self.queue.pop_front()
    }

    /// Marks the request's channel finished and raises DMA if requested.
    pub fn complete(&mut self, request: &DmaRequest, interrupts: &mut InterruptController) {
        let channel = &mut self.channels[request.channel];
        channel.command.set_bit_off(CMD_START);
        channel.status.set_bit_on(STATUS_DONE);
        channel.ram_address = channel.ram_address.wrapping_add(request.words() * 4);

        self.stats.transfers += 1;
        self.stats.bytes += u64::from(request.length);

        if channel.command.is_bit_on(CMD_INTERRUPT) {
            interrupts.set_pending(InterruptMask::DMA);
        }
        tracing::debug!(
            "dma channel {} moved {} bytes",
            request.channel,
            request.length
        );
    }

    fn completed_mask(&self) -> u32 {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.status.is_bit_on(STATUS_DONE))
            .fold(0, |mask, (idx, _)| mask | (1 << idx))
    }

    fn decode(offset: u32) -> Option<(usize, u32)> {
        let offset = offset.checked_sub(CHANNEL_BASE)?;
        let channel = (offset / CHANNEL_STRIDE) as usize;
        (channel < CHANNEL_COUNT).then_some((channel, offset % CHANNEL_STRIDE))
    }

    fn start(&mut self, idx: usize) {
        let channel = &self.channels[idx];
        let request = DmaRequest {
            channel: idx,
            ram_address: channel.ram_address,
            peripheral_address: channel.peripheral_address,
            length: channel.command.get_bits(0..=15) + 4,
            to_peripheral: channel.command.is_bit_on(CMD_RAM_TO_PERIPHERAL),
        };
        tracing::trace!("dma request {request:?}");
        self.queue.push_back(request);
    }
}

impl IoDevice for Dma {
    fn read_word(&mut self, offset: u32, ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            MASTER_CONTROL => return self.control,
            MASTER_STATUS => return self.completed_mask(),
            REQ_STATUS => return 0,
            _ => {}
        }
        let Some((idx, register)) = Self::decode(offset) else {
            return 0;
        };

        let channel = &mut self.channels[idx];
        match register {
            CMD => channel.command,
            STATUS => {
                let status = channel.status;
                channel.status.set_bit_off(STATUS_DONE);
                if self.completed_mask() == 0 {
                    ctx.interrupts.clear_pending(InterruptMask::DMA);
                }
                status
            }
            RAM_ADDR => channel.ram_address,
            FLAGS => channel.flags,
            PER_ADDR => channel.peripheral_address,
            INCR => channel.increment,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        if offset == MASTER_CONTROL {
            self.control = value;
            return;
        }
        let Some((idx, register)) = Self::decode(offset) else {
            tracing::debug!("dma write to {offset:#x} ignored");
            return;
        };

        let channel = &mut self.channels[idx];
        match register {
            CMD => {
                channel.command = value;
                if value.is_bit_on(CMD_START) {
                    self.start(idx);
                }
            }
            RAM_ADDR => channel.ram_address = value,
            FLAGS => channel.flags = value,
            PER_ADDR => channel.peripheral_address = value,
            INCR => channel.increment = value,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::CoreId;
    use pretty_assertions::assert_eq;

    fn ctx(interrupts: &mut InterruptController) -> IoContext<'_> {
        IoContext {
            core: CoreId::Cpu,
            interrupts,
        }
    }

    #[test]
    fn start_queues_request() {
        let mut dma = Dma::default();
        let mut ic = InterruptController::default();
        let base = CHANNEL_BASE + 2 * CHANNEL_STRIDE;

        dma.write_word(base + RAM_ADDR, 0x1000_0100, &mut ctx(&mut ic));
        dma.write_word(base + PER_ADDR, 0x7000_2840, &mut ctx(&mut ic));
        dma.write_word(base + CMD, 0x8800_000C, &mut ctx(&mut ic));

        let request = dma.take_request().unwrap();
        assert_eq!(
            request,
            DmaRequest {
                channel: 2,
                ram_address: 0x1000_0100,
                peripheral_address: 0x7000_2840,
                length: 16,
                to_peripheral: true,
            }
        );
        assert_eq!(request.words(), 4);
        assert_eq!(dma.take_request(), None);
    }

    #[test]
    fn completion_latches_and_interrupts() {
        let mut dma = Dma::default();
        let mut ic = InterruptController::default();
        dma.write_word(CHANNEL_BASE + CMD, 0xC000_0000, &mut ctx(&mut ic));
        let request = dma.take_request().unwrap();

        dma.complete(&request, &mut ic);

        assert!(ic.is_pending(InterruptMask::DMA));
        assert_eq!(dma.read_word(CHANNEL_BASE + CMD, &mut ctx(&mut ic)) >> 31, 0);
        assert_eq!(dma.read_word(MASTER_STATUS, &mut ctx(&mut ic)), 1);
        assert_eq!(dma.read_word(CHANNEL_BASE + STATUS, &mut ctx(&mut ic)), 1 << 30);
        assert_eq!(dma.read_word(CHANNEL_BASE + STATUS, &mut ctx(&mut ic)), 0);
        assert!(!ic.is_pending(InterruptMask::DMA));
        assert_eq!(dma.stats().bytes, 4);
    }

    #[test]
    fn completion_without_interrupt_enable() {
        let mut dma = Dma::default();
        let mut ic = InterruptController::default();
        dma.write_word(CHANNEL_BASE + CMD, 0x8000_0004, &mut ctx(&mut ic));
        let request = dma.take_request().unwrap();

        dma.complete(&request, &mut ic);

        assert!(!ic.is_pending(InterruptMask::DMA));
        assert_eq!(dma.stats().transfers, 1);
    }
}
