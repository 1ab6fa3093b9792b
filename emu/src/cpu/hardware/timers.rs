//! Timer bank at `0x6000_5000`.
//!
//! Two countdown timers with microsecond resolution, a free running
//! microsecond counter and a seconds RTC. `tick` converts CPU cycles into
//! elapsed microseconds with the configured core clock, carrying the
//! remainder so no time is lost between steps.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::hardware::interrupt_control::{InterruptController, InterruptMask};
use crate::cpu::hardware::{IoContext, IoDevice};

pub const TIMER1_CFG: u32 = 0x00;
pub const TIMER1_VAL: u32 = 0x04;
pub const TIMER2_CFG: u32 = 0x08;
pub const TIMER2_VAL: u32 = 0x0C;
pub const USEC_TIMER: u32 = 0x10;
pub const RTC: u32 = 0x14;

const CFG_ENABLE: u8 = 31;
const CFG_REPEAT: u8 = 30;
const CFG_PERIOD_MASK: u32 = 0x1FFF_FFFF;

const MICROS_PER_SECOND: u64 = 1_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    pub timer1_expirations: u64,
    pub timer2_expirations: u64,
    pub elapsed_micros: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Timer {
    config: u32,
    remaining: u32,
}

impl Timer {
    const fn period(&self) -> u32 {
        (self.config & CFG_PERIOD_MASK) + 1
    }

    fn is_enabled(&self) -> bool {
        self.config.is_bit_on(CFG_ENABLE)
    }

    fn configure(&mut self, value: u32) {
        self.config = value;
        self.remaining = if self.is_enabled() { self.period() } else { 0 };
    }

    /// Advances by `micros`; returns whether the timer expired.
    fn advance(&mut self, micros: u32) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if micros < self.remaining {
            self.remaining -= micros;
            return false;
        }

        let overshoot = micros - self.remaining;
        if self.config.is_bit_on(CFG_REPEAT) {
            self.remaining = self.period() - overshoot % self.period();
        } else {
            self.config.set_bit_off(CFG_ENABLE);
            self.remaining = 0;
        }

        true
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Timers {
    timer1: Timer,
    timer2: Timer,
    usec: u32,
    rtc: u32,
    /// Cycle remainder scaled by one million, below one microsecond.
    cycle_remainder: u64,
    /// Microseconds towards the next RTC second.
    rtc_micros: u64,
    #[serde(skip)]
    stats: TimerStats,
}

impl Timers {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub const fn stats(&self) -> TimerStats {
        self.stats
    }

    #[must_use]
    pub const fn usec(&self) -> u32 {
        self.usec
    }

    /// Advances all counters by `cycles` at `clock_hz`.
    pub fn tick(&mut self, cycles: u32, clock_hz: u32, interrupts: &mut InterruptController) {
        self.cycle_remainder += u64::from(cycles) * MICROS_PER_SECOND;
        let micros = self.cycle_remainder / u64::from(clock_hz);
        self.cycle_remainder %= u64::from(clock_hz);
        if micros == 0 {
            return;
        }

        self.stats.elapsed_micros += micros;
        let micros = u32::try_from(micros).unwrap_or(u32::MAX);
        self.usec = self.usec.wrapping_add(micros);

        self.rtc_micros += u64::from(micros);
        while self.rtc_micros >= MICROS_PER_SECOND {
            self.rtc_micros -= MICROS_PER_SECOND;
            self.rtc = self.rtc.wrapping_add(1);
        }

        if self.timer1.advance(micros) {
            self.stats.timer1_expirations += 1;
            interrupts.set_pending(InterruptMask::TIMER1);
        }
        if self.timer2.advance(micros) {
            self.stats.timer2_expirations += 1;
            interrupts.set_pending(InterruptMask::TIMER2);
        }
    }
}

impl IoDevice for Timers {
    fn read_word(&mut self, offset: u32, ctx: &mut IoContext<'_>) -> u32 {
        match offset {
            TIMER1_CFG => self.timer1.config,
            TIMER1_VAL => {
                ctx.interrupts.clear_pending(InterruptMask::TIMER1);
                self.timer1.remaining
            }
            TIMER2_CFG => self.timer2.config,
            TIMER2_VAL => {
                ctx.interrupts.clear_pending(InterruptMask::TIMER2);
                self.timer2.remaining
            }
            USEC_TIMER => self.usec,
            RTC => self.rtc,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32, _ctx: &mut IoContext<'_>) {
        match offset {
            TIMER1_CFG => self.timer1.configure(value),
            TIMER2_CFG => self.timer2.configure(value),
            USEC_TIMER => self.usec = value,
            RTC => {
                self.rtc = value;
                self.rtc_micros = 0;
            }
            _ => tracing::debug!("timer write to {offset:#x} ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::hardware::CoreId;
    use pretty_assertions::assert_eq;

    const CLOCK: u32 = 80_000_000;

    fn ctx(interrupts: &mut InterruptController) -> IoContext<'_> {
        IoContext {
            core: CoreId::Cpu,
            interrupts,
        }
    }

    #[test]
    fn usec_counts_with_clock() {
        let mut timers = Timers::default();
        let mut ic = InterruptController::default();

        timers.tick(79, CLOCK, &mut ic);
        assert_eq!(timers.usec(), 0);

        timers.tick(1, CLOCK, &mut ic);
        assert_eq!(timers.usec(), 1);

        timers.tick(8_000, CLOCK, &mut ic);
        assert_eq!(timers.usec(), 101);
    }

    #[test]
    fn one_shot_timer_fires_once() {
        let mut timers = Timers::default();
        let mut ic = InterruptController::default();
        timers.write_word(TIMER1_CFG, 0x8000_0000 | 9, &mut ctx(&mut ic));

        timers.tick(9 * 80, CLOCK, &mut ic);
        assert!(!ic.is_pending(InterruptMask::TIMER1));
        assert_eq!(timers.read_word(TIMER1_VAL, &mut ctx(&mut ic)), 1);

        timers.tick(80, CLOCK, &mut ic);
        assert!(ic.is_pending(InterruptMask::TIMER1));

        assert_eq!(timers.read_word(TIMER1_VAL, &mut ctx(&mut ic)), 0);
        assert!(!ic.is_pending(InterruptMask::TIMER1));

        timers.tick(80 * 100, CLOCK, &mut ic);
        assert!(!ic.is_pending(InterruptMask::TIMER1));
        assert_eq!(timers.stats().timer1_expirations, 1);
    }

    #[test]
    fn repeating_timer_reloads() {
        let mut timers = Timers::default();
        let mut ic = InterruptController::default();
        timers.write_word(TIMER2_CFG, 0xC000_0000 | 99, &mut ctx(&mut ic));

        timers.tick(80 * 130, CLOCK, &mut ic);

        assert!(ic.is_pending(InterruptMask::TIMER2));
        assert_eq!(timers.read_word(TIMER2_VAL, &mut ctx(&mut ic)), 70);

        timers.tick(80 * 70, CLOCK, &mut ic);
        assert!(ic.is_pending(InterruptMask::TIMER2));
        assert_eq!(timers.stats().timer2_expirations, 2);
    }

    #[test]
    fn rtc_counts_seconds() {
        let mut timers = Timers::default();
        let mut ic = InterruptController::default();
        timers.write_word(RTC, 41, &mut ctx(&mut ic));

        timers.tick(CLOCK, CLOCK, &mut ic);

        assert_eq!(timers.read_word(RTC, &mut ctx(&mut ic)), 42);
    }
}
