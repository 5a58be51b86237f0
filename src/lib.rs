//! A CHIP-8 virtual machine with a serialized two-clock scheduler.

pub mod debugger;
pub mod emu;
mod nibble;

pub use nibble::u4;
