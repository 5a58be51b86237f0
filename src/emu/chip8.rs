use rand::{SeedableRng, rngs::StdRng};

use super::{
    Chip8Error, Chip8Result, DISPLAY_SIZE, DISPLAY_X, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS,
    Framebuffer, Instruction, MAX_ROM_SIZE, MEMORY_SIZE, Opcode, ROM_START_ADDRESS, STACK_DEPTH,
};
use crate::u4;

/// CHIP-8 virtual machine state
#[derive(Clone, Debug)]
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels, row-major
    pub(crate) display: Framebuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Return addresses, `stack[..sp]` are live
    pub(crate) stack: [u16; STACK_DEPTH],
    /// Number of active subroutine calls
    pub(crate) sp: usize,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],
    /// Most recent key press, consumed by Fx0A
    pub(crate) last_key: Option<u4>,

    pub(crate) rng: StdRng,
}

impl Chip8 {
    /// Creates a machine with an OS-seeded random generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Creates a machine whose `Cxnn` results are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            display: [false; DISPLAY_SIZE],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: [0; STACK_DEPTH],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            keypad: [false; 16],
            last_key: None,
            rng,
        };
        chip8.load_font();
        chip8
    }

    /// Zeroes every field except the random generator and reloads the font.
    pub fn reset(&mut self) {
        self.memory = [0; MEMORY_SIZE];
        self.display = [false; DISPLAY_SIZE];
        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; 16];
        self.stack = [0; STACK_DEPTH];
        self.sp = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.keypad = [false; 16];
        self.last_key = None;
        self.load_font();
    }

    /// Resets the machine and copies a ROM to the program region.
    ///
    /// An oversized ROM is rejected before anything is touched.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.reset();
        self.memory[ROM_START_ADDRESS..ROM_START_ADDRESS + rom.len()].copy_from_slice(rom);

        Ok(())
    }

    fn load_font(&mut self) {
        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    pub fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        let instruction = self.fetch()?;
        self.execute(instruction.into())
    }

    /// Decodes the instruction at PC without executing it.
    pub fn fetch(&self) -> Result<Instruction, Chip8Error> {
        let addr = self.pc as usize;
        match self.memory.get(addr..addr + 2) {
            Some(&[high, low]) => Ok(Instruction::decode(high, low)),
            _ => Err(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEMORY_SIZE),
            }),
        }
    }

    /// Decodes the instruction at PC into its opcode, for tracing.
    pub fn peek_opcode(&self) -> Result<Opcode, Chip8Error> {
        self.fetch().map(Opcode::from)
    }

    /// Runs one 60Hz timer tick. Returns true when the sound timer was active.
    pub fn timers_cycle(&mut self) -> bool {
        if self.delay_timer > 0 {
            self.delay_timer -= 1;
        }

        if self.sound_timer > 0 {
            self.sound_timer -= 1;
            return true;
        }

        false
    }

    /// Marks a key as pressed and latches it as the last pressed key.
    pub fn set_key(&mut self, key: u4) {
        self.keypad[key] = true;
        self.last_key = Some(key);
    }

    /// Marks a key as released. The latch is dropped only if it holds this key.
    pub fn clear_key(&mut self, key: u4) {
        self.keypad[key] = false;
        if self.last_key == Some(key) {
            self.last_key = None;
        }
    }

    pub fn is_key_pressed(&self, key: u4) -> bool {
        self.keypad[key]
    }

    pub fn last_key(&self) -> Option<u4> {
        self.last_key
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.display[y * DISPLAY_X + x]
    }

    pub fn display(&self) -> &Framebuffer {
        &self.display
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self) -> &[u8; 16] {
        &self.v
    }

    /// Active return addresses, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..self.sp]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn set_register(&mut self, reg: u4, value: u8) {
        self.v[reg] = value;
    }

    pub fn set_index(&mut self, value: u16) {
        self.i = value;
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.delay_timer = value;
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.sound_timer = value;
    }

    /// Copies `bytes` to memory at `addr`, failing without writing if any byte would land out of range.
    pub fn write_memory(&mut self, addr: usize, bytes: &[u8]) -> Result<(), Chip8Error> {
        self.mem_slice(addr, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn push_stack(&mut self, addr: u16) -> Result<(), Chip8Error> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or(Chip8Error::StackOverflow)?;
        *slot = addr;
        self.sp += 1;
        Ok(())
    }

    pub fn pop_stack(&mut self) -> Result<u16, Chip8Error> {
        self.sp = self.sp.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
        Ok(self.stack[self.sp])
    }

    /// Helper to get a mutable memory range with bounds checking.
    pub(crate) fn mem_slice(&mut self, addr: usize, len: usize) -> Result<&mut [u8], Chip8Error> {
        // Report the first address that falls outside memory
        self.memory
            .get_mut(addr..addr + len)
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: addr.max(MEMORY_SIZE),
            })
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}
