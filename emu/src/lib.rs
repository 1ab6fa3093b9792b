//! Cycle-stepped emulator of a dual-core ARM7TDMI media player SoC.
//!
//! [`emulator::Emulator`] owns both cores and the [`bus::Bus`], which in
//! turn owns the memories and every peripheral.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
mod bitwise;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::unreadable_literal)]
pub mod bus;
pub mod config;
pub mod cpu;
pub mod disk;
pub mod emulator;
pub mod error;

#[allow(clippy::cast_possible_truncation)]
pub mod gdb;
