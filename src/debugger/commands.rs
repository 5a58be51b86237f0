use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_num::maybe_hex;

use crate::{
    emu::{Chip8Error, Chip8Result, Framebuffer, Opcode, Register, Snapshot},
    u4,
};

#[derive(Parser)]
#[command(multicall = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Start or resume both clocks
    #[command(visible_alias = "r")]
    Run,

    /// Stop both clocks
    #[command(visible_alias = "p")]
    Pause,

    /// Execute a single instruction
    #[command(visible_alias = "s")]
    Step,

    /// Press or release a keypad key (0-F)
    #[command(visible_alias = "k")]
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Reset and load a ROM file
    #[command(visible_alias = "l")]
    Load { path: PathBuf },

    /// Show registers, timers and stack
    #[command(visible_alias = "v")]
    Regs,

    /// Dump the framebuffer
    Screen,

    /// Overwrite a register: v0-vf, i, pc, dt, st
    Set {
        #[arg(value_parser = parse_set_target)]
        target: Register,
        #[arg(value_parser = maybe_hex::<u16>)]
        value: u16,
    },

    /// Hex dump of memory
    #[command(visible_alias = "m")]
    Mem {
        #[arg(default_value = "0x200", value_parser = maybe_hex::<u16>)]
        start: u16,
        #[arg(default_value = "64", value_parser = maybe_hex::<u16>)]
        len: u16,
    },

    /// Disassemble instructions, starting at PC by default
    #[command(visible_alias = "d")]
    Disasm {
        #[arg(value_parser = maybe_hex::<u16>)]
        start: Option<u16>,
        #[arg(default_value = "8", value_parser = maybe_hex::<u16>)]
        count: u16,
    },

    #[command(visible_alias = "q")]
    Quit,
}

#[derive(Subcommand, Clone)]
pub enum KeyAction {
    #[command(visible_alias = "d")]
    Down {
        #[arg(value_parser = parse_key)]
        key: u4,
    },

    #[command(visible_alias = "u")]
    Up {
        #[arg(value_parser = parse_key)]
        key: u4,
    },
}

pub enum CommandResult {
    Ok,
    Stepped(Chip8Result),
    Registers(Box<Snapshot>),
    Screen(Box<Framebuffer>),
    MemDump { data: Vec<u8>, offset: u16 },
    Disasm { instructions: Vec<(u16, Opcode)> },
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Error while executing cpu instruction: {0}")]
    Chip8Error(#[from] Chip8Error),
    #[error("Failed to read ROM file {}: {source}", path.display())]
    ReadRom {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Value out of range")]
    ValueOutOfRange,
}

fn parse_key(s: &str) -> Result<u4, String> {
    let digits = s.trim_start_matches("0x");
    let value = u8::from_str_radix(digits, 16).map_err(|e| format!("Invalid key '{s}': {e}"))?;
    u4::try_from(value).map_err(|e| e.to_string())
}

fn parse_set_target(s: &str) -> Result<Register, String> {
    let lower = s.to_lowercase();

    match lower.as_str() {
        "index" | "i" => Ok(Register::I),
        "pc" => Ok(Register::Pc),
        "dt" => Ok(Register::DelayTimer),
        "st" => Ok(Register::SoundTimer),

        _ if lower.starts_with('v') => {
            let hex_str = &lower[1..];
            match u8::from_str_radix(hex_str, 16) {
                Ok(val) if val < 16 => Ok(Register::V(u4::new(val))),
                _ => Err(format!("Invalid register: '{}'", s)),
            }
        }

        _ => Err(format!("Unknown set target: '{}'", s)),
    }
}
