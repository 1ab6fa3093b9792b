#[allow(clippy::cast_possible_truncation)]
mod alu;

mod arm;

#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::module_name_repetitions)]
pub mod arm7tdmi;
mod condition;
pub mod cpu_modes;

#[allow(clippy::cast_possible_truncation)]
mod flags;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
pub mod psr;
mod register_bank;
pub mod registers;
mod thumb;
