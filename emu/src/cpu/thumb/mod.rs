//! # Thumb Instruction Set (16-bit)
//!
//! Compressed encoding of a subset of the ARM instruction set. Only branches
//! are conditional; most formats reach R0-R7 only.
//!
//! - [`instruction`] - Decoding (`From<u16>`)
//! - [`operations`] - Execution and cycle costs
//! - [`alu_instructions`] - Format 4 and format 5 operations
//! - [`mode`] - Decoded opcode wrapper

pub mod alu_instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_sign_loss)]
pub mod instruction;

#[allow(clippy::cast_possible_truncation)]
pub mod mode;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::too_many_lines)]
pub mod operations;
