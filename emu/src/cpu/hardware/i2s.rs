//! I2S audio transmitter at `0x7000_2800`.
//!
//! Firmware pushes stereo frames into a 16-entry FIFO; [`I2s::tick`] drains
//! it at the 44.1 kHz sample rate, applies the codec headphone volume and
//! appends the result to a bounded host queue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::i2c::I2c;
use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{IoContext, IoDevice};

pub const IISCONFIG: u32 = 0x00;
pub const IISCLK: u32 = 0x08;
pub const IISFIFO_CFG: u32 = 0x0C;
pub const IISFIFO_WR: u32 = 0x40;
pub const IISFIFO_RD: u32 = 0x80;

const CONFIG_RESET: u8 = 31;
const CONFIG_TX_ENABLE: u8 = 29;
const FIFO_CFG_TX_INTERRUPT: u8 = 1;
const FIFO_FREE_SHIFT: u32 = 16;
const FIFO_FREE_MASK: u32 = 0x3F << FIFO_FREE_SHIFT;

pub const FIFO_DEPTH: usize = 16;
const INTERRUPT_THRESHOLD: usize = 8;

pub const SAMPLE_RATE: u32 = 44_100;

/// Host queue bound in stereo frames, one second of audio.
const HOST_QUEUE_FRAMES: usize = SAMPLE_RATE as usize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct I2sStats {
    pub frames_played: u64,
    pub underruns: u64,
    pub overflows: u64,
    pub dropped_host_frames: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct I2s {
    config: u32,
    clock: u32,
    fifo_config: u32,
    fifo: VecDeque<u32>,
    /// Interleaved left/right samples waiting for the host.
    samples: VecDeque<i16>,
    /// Cycle remainder scaled by the sample rate.
    cycle_remainder: u64,
    #[serde(skip)]
    stats: I2sStats,
}

impl I2s {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> I2sStats {
        self.stats
    }

    #[must_use]
    pub fn free_entries(&self) -> usize {
        FIFO_DEPTH - self.fifo.len()
    }

    fn tx_enabled(&self) -> bool {
        self.config.is_bit_on(CONFIG_TX_ENABLE)
    }

    /// Drains everything queued for the host.
    pub fn take_samples(&mut self) -> Vec<i16> {
        self.samples.drain(..).collect()
    }

    fn update_interrupt(&self, interrupts: &mut InterruptController) {
        let asserted = self.fifo_config.is_bit_on(FIFO_CFG_TX_INTERRUPT)
            && self.free_entries() >= INTERRUPT_THRESHOLD;
        interrupts.set_level(InterruptMask::I2S, asserted);
    }

    /// Plays the frames that fall due in `cycles` at `clock_hz`.
    pub fn tick(
        &mut self,
        cycles: u32,
        clock_hz: u32,
        i2c: &I2c,
        interrupts: &mut InterruptController,
    ) {
        self.cycle_remainder += u64::from(cycles) * u64::from(SAMPLE_RATE);
        let frames = self.cycle_remainder / u64::from(clock_hz);
        self.cycle_remainder %= u64::from(clock_hz);
        if frames == 0 || !self.tx_enabled() {
            return;
        }

        let (left_gain, right_gain) = i2c.codec.headphone_gain();
        for _ in 0..frames {
            let Some(frame) = self.fifo.pop_front() else {
                self.stats.underruns += 1;
                break;
            };
            let left = scale((frame >> 16) as i16, left_gain);
            let right = scale(frame as i16, right_gain);

            if self.samples.len() >= HOST_QUEUE_FRAMES * 2 {
                self.samples.drain(..2);
                self.stats.dropped_host_frames += 1;
            }
            self.samples.push_back(left);
            self.samples.push_back(right);
            self.stats.frames_played += 1;
        }

        self.update_interrupt(interrupts);
    }
}

fn scale(sample: i16, gain: f32) -> i16 {
    (f32::from(sample) * gain)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

impl IoDevice for I2s {
    fn read_word(&mut self, offset: u32, _ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            IISCONFIG => self.config,
            IISCLK => self.clock,
            IISFIFO_CFG => {
                (self.fifo_config & !FIFO_FREE_MASK)
                    | (self.free_entries() as u32) << FIFO_FREE_SHIFT
            }
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, ctx: &mut IoContext<'_>) {
        match offset {
            IISCONFIG => {
                if value.is_bit_on(CONFIG_RESET) {
                    tracing::debug!("i2s fifo reset");
                    self.fifo.clear();
                }
                let mut value = value;
                value.set_bit_off(CONFIG_RESET);
                self.config = value;
            }
            IISCLK => self.clock = value,
            IISFIFO_CFG => self.fifo_config = value & !FIFO_FREE_MASK,
            IISFIFO_WR => {
                if self.fifo.len() < FIFO_DEPTH {
                    self.fifo.push_back(value);
                } else {
                    self.stats.overflows += 1;
                }
            }
            IISFIFO_RD => {}
            _ => tracing::debug!("i2s write to {offset:#x} ignored"),
        }
        self.update_interrupt(ctx.interrupts);
    }
}
