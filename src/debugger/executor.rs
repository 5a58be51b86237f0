use super::commands::{Command, CommandError, CommandResult, KeyAction};
use crate::emu::{Emulator, MEMORY_SIZE, Opcode, Snapshot};

/// Runs debugger commands against an emulator.
pub struct Executor {
    emulator: Emulator,
}

impl Executor {
    pub fn new(emulator: Emulator) -> Self {
        Self { emulator }
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.emulator.resume()?;
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.emulator.stop()?;
                Ok(CommandResult::Ok)
            }
            Command::Step => Ok(CommandResult::Stepped(self.emulator.step()?)),
            Command::Key { action } => {
                match action {
                    KeyAction::Down { key } => self.emulator.set_key(key)?,
                    KeyAction::Up { key } => self.emulator.clear_key(key)?,
                }
                Ok(CommandResult::Ok)
            }
            Command::Load { path } => {
                let rom = std::fs::read(&path).map_err(|source| CommandError::ReadRom {
                    path: path.clone(),
                    source,
                })?;
                self.emulator.load_rom(rom)?;
                Ok(CommandResult::Ok)
            }
            Command::Regs => Ok(CommandResult::Registers(Box::new(self.snapshot()?))),
            Command::Screen => Ok(CommandResult::Screen(Box::new(
                *self.snapshot()?.chip8.display(),
            ))),
            Command::Set { target, value } => {
                self.emulator.poke(target, value)?;
                Ok(CommandResult::Ok)
            }
            Command::Mem { start, len } => self.handle_mem(start, len),
            Command::Disasm { start, count } => self.handle_disasm(start, count),
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, CommandError> {
        Ok(self.emulator.snapshot()?)
    }

    fn handle_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let (start_addr, end) = (start as usize, start as usize + len as usize);
        if end > MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }

        let snapshot = self.snapshot()?;
        Ok(CommandResult::MemDump {
            data: snapshot.chip8.memory()[start_addr..end].to_vec(),
            offset: start,
        })
    }

    fn handle_disasm(&self, start: Option<u16>, count: u16) -> Result<CommandResult, CommandError> {
        let snapshot = self.snapshot()?;
        let start = start.unwrap_or(snapshot.chip8.pc());
        if start as usize + count as usize * 2 > MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }

        let memory = snapshot.chip8.memory();
        let instructions = (0..count)
            .map(|idx| {
                let addr = start + idx * 2;
                let raw = u16::from_be_bytes([memory[addr as usize], memory[addr as usize + 1]]);
                (addr, Opcode::decode(raw))
            })
            .collect();

        Ok(CommandResult::Disasm { instructions })
    }
}
