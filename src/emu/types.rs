// Machine dimensions and memory layout
pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
pub const DISPLAY_SIZE: usize = DISPLAY_X * DISPLAY_Y;

pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;
/// Maximum number of nested subroutine calls.
pub const STACK_DEPTH: usize = 16;

/// The CHIP-8 display buffer, row-major, `true` = pixel on.
pub type Framebuffer = [bool; DISPLAY_SIZE];

/// Outcome of a single successfully executed instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip8Result {
    /// Nothing observable beyond machine state changed.
    Continue,
    /// The framebuffer changed (clear or draw) and should be presented.
    Redraw,
    /// Fx0A found no latched key; the PC was rewound so it runs again next tick.
    WaitingForKey,
    /// The opcode did not decode. Only the default PC advance happened.
    UnknownOpcode(u16),
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("Stack overflow: more than 16 nested subroutine calls")]
    StackOverflow,

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Invalid key code {key:#04X}, expected 0x0-0xF")]
    InvalidKey { key: u8 },

    #[error("Emulator worker is no longer running")]
    Disconnected,
}

impl Chip8Error {
    /// Faults leave the machine in a state that must not keep executing.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Chip8Error::MemoryOutOfBounds { .. }
                | Chip8Error::StackOverflow
                | Chip8Error::StackUnderflow
        )
    }
}
