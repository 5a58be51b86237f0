mod chip8;
mod config;
mod execute;
mod font;
mod opcode;
mod ports;
mod runner;
mod trace;
mod types;

pub use chip8::*;
pub use config::*;
pub use font::*;
pub use opcode::*;
pub use ports::*;
pub use runner::*;
pub use trace::*;
pub use types::*;
