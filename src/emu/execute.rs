use rand::Rng;

use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    Opcode, OpcodeALU,
};
use crate::u4;

impl Chip8 {
    /// Applies one decoded instruction.
    ///
    /// The PC is advanced past the instruction before the opcode runs, so jumps,
    /// calls and skips override or extend that default.
    pub fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::Sys { nnn } => {
                log::debug!("Ignoring machine code routine call to {nnn:#05X}");
            }
            Opcode::ClearDisplay => {
                self.display.fill(false);
                return Ok(Chip8Result::Redraw);
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn + u16::from(self.v[0]);
            }
            Opcode::Call { nnn } => {
                self.push_stack(self.pc)?;
                self.pc = nnn;
            }
            Opcode::Return => {
                self.pc = self.pop_stack()?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.skip();
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.skip();
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.skip();
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                if self.key_in(x) {
                    self.skip();
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.key_in(x) {
                    self.skip();
                }
            }
            Opcode::WaitForKey { x } => {
                return Ok(self.execute_wait_for_key(x));
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
            }
            Opcode::FontChar { x } => {
                self.i = (FONT_START_ADDRESS + FONT_GLYPH_SIZE * usize::from(self.v[x])) as u16;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                let digits = self.mem_slice(self.i.into(), 3)?;
                digits[0] = value / 100;
                digits[1] = (value / 10) % 10;
                digits[2] = value % 10;
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let regs = self.v;
                self.mem_slice(self.i.into(), count)?
                    .copy_from_slice(&regs[..count]);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let mut block = [0; 16];
                block[..count].copy_from_slice(self.mem_slice(self.i.into(), count)?);
                self.v[..count].copy_from_slice(&block[..count]);
            }
            Opcode::Unknown(opcode) => {
                return Ok(Chip8Result::UnknownOpcode(opcode));
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    /// Keys above 0xF are never pressed.
    fn key_in(&self, x: u4) -> bool {
        self.keypad
            .get(usize::from(self.v[x]))
            .copied()
            .unwrap_or(false)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let (vx, vy) = (self.v[x], self.v[y]);

        // VF is written last so the flag survives when x is F
        match op {
            OpcodeALU::Set => self.v[x] = vy,
            OpcodeALU::Or => self.v[x] = vx | vy,
            OpcodeALU::And => self.v[x] = vx & vy,
            OpcodeALU::Xor => self.v[x] = vx ^ vy,
            OpcodeALU::Add => {
                let (res, overflow) = vx.overflowing_add(vy);
                self.v[x] = res;
                self.v[0xF] = overflow.into();
            }
            OpcodeALU::Sub => {
                self.v[x] = vx.wrapping_sub(vy);
                self.v[0xF] = (vx > vy).into();
            }
            OpcodeALU::SubReverse => {
                self.v[x] = vy.wrapping_sub(vx);
                self.v[0xF] = (vy > vx).into();
            }
            OpcodeALU::ShiftRight => {
                self.v[x] = vx >> 1;
                self.v[0xF] = vx & 1;
            }
            OpcodeALU::ShiftLeft => {
                self.v[x] = vx << 1;
                self.v[0xF] = vx >> 7;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<Chip8Result, Chip8Error> {
        let x_pos = usize::from(self.v[x]);
        let y_pos = usize::from(self.v[y]);

        // Read the whole sprite first so a bad I leaves the screen untouched
        let mut sprite = [0u8; 16];
        let rows = usize::from(n);
        sprite[..rows].copy_from_slice(self.mem_slice(self.i.into(), rows)?);

        let mut any_erased = false;
        for (row, sprite_byte) in sprite[..rows].iter().enumerate() {
            let py = (y_pos + row) % DISPLAY_Y;

            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let px = (x_pos + col) % DISPLAY_X;
                    let pixel = &mut self.display[py * DISPLAY_X + px];

                    if *pixel {
                        any_erased = true;
                    }

                    // Flip the pixel
                    *pixel ^= true;
                }
            }
        }

        self.v[0xF] = any_erased.into();
        Ok(Chip8Result::Redraw)
    }

    fn execute_wait_for_key(&mut self, x: u4) -> Chip8Result {
        if let Some(key) = self.last_key.take() {
            self.v[x] = key.into();
            return Chip8Result::Continue;
        }

        // Repeat this instruction until a key is latched
        self.pc = self.pc.wrapping_sub(2);
        Chip8Result::WaitingForKey
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: u16 = 0x200;

    fn machine() -> Chip8 {
        Chip8::with_seed(7)
    }

    /// Writes `opcode` at PC and executes exactly one cycle.
    fn run(chip8: &mut Chip8, opcode: u16) -> Result<Chip8Result, Chip8Error> {
        let pc = chip8.pc() as usize;
        chip8.write_memory(pc, &opcode.to_be_bytes()).unwrap();
        chip8.cpu_cycle()
    }

    fn regs(chip8: &mut Chip8, values: &[(u8, u8)]) {
        for &(reg, value) in values {
            chip8.set_register(u4::new(reg), value);
        }
    }

    #[test]
    fn clear_display() {
        let mut chip8 = machine();
        chip8.display[0] = true;
        chip8.display[2047] = true;
        assert_eq!(run(&mut chip8, 0x00E0), Ok(Chip8Result::Redraw));
        assert!(chip8.display().iter().all(|p| !p));
        assert_eq!(chip8.pc(), START + 2);
    }

    #[test]
    fn sys_is_a_no_op() {
        let mut chip8 = machine();
        let before = chip8.v;
        assert_eq!(run(&mut chip8, 0x0123), Ok(Chip8Result::Continue));
        assert_eq!(chip8.v, before);
        assert_eq!(chip8.pc(), START + 2);
    }

    #[test]
    fn call_and_return() {
        let mut chip8 = machine();
        run(&mut chip8, 0x2400).unwrap();
        assert_eq!(chip8.pc(), 0x400);
        assert_eq!(chip8.stack(), &[START + 2]);

        run(&mut chip8, 0x00EE).unwrap();
        assert_eq!(chip8.pc(), START + 2);
        assert!(chip8.stack().is_empty());
    }

    #[test]
    fn return_with_empty_stack_underflows() {
        let mut chip8 = machine();
        assert_eq!(run(&mut chip8, 0x00EE), Err(Chip8Error::StackUnderflow));
    }

    #[test]
    fn seventeenth_nested_call_overflows() {
        let mut chip8 = machine();
        // Subroutine at 0x300 calls itself
        chip8.write_memory(0x300, &[0x23, 0x00]).unwrap();
        chip8.set_pc(0x300);
        for _ in 0..16 {
            chip8.cpu_cycle().unwrap();
        }
        assert_eq!(chip8.cpu_cycle(), Err(Chip8Error::StackOverflow));
        assert_eq!(chip8.stack().len(), 16);
    }

    #[test]
    fn jumps() {
        let mut chip8 = machine();
        run(&mut chip8, 0x1ABC).unwrap();
        assert_eq!(chip8.pc(), 0xABC);

        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 0x10)]);
        run(&mut chip8, 0xB300).unwrap();
        assert_eq!(chip8.pc(), 0x310);
    }

    #[test]
    fn skips() {
        // (setup, opcode, skipped)
        let table: [(&[(u8, u8)], u16, bool); 8] = [
            (&[(1, 0x42)], 0x3142, true),
            (&[(1, 0x41)], 0x3142, false),
            (&[(1, 0x41)], 0x4142, true),
            (&[(1, 0x42)], 0x4142, false),
            (&[(1, 7), (2, 7)], 0x5120, true),
            (&[(1, 7), (2, 8)], 0x5120, false),
            (&[(1, 7), (2, 8)], 0x9120, true),
            (&[(1, 7), (2, 7)], 0x9120, false),
        ];

        for (setup, opcode, skipped) in table {
            let mut chip8 = machine();
            regs(&mut chip8, setup);
            run(&mut chip8, opcode).unwrap();
            let expected = if skipped { START + 4 } else { START + 2 };
            assert_eq!(chip8.pc(), expected, "opcode {opcode:#06X}");
        }
    }

    #[test]
    fn immediate_loads_and_adds() {
        let mut chip8 = machine();
        run(&mut chip8, 0x6AFE).unwrap();
        assert_eq!(chip8.v()[0xA], 0xFE);

        run(&mut chip8, 0x7A03).unwrap();
        assert_eq!(chip8.v()[0xA], 0x01);
        // 7xnn never touches the flag
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn alu_table() {
        // (vx, vy, opcode with x=1 y=2, expected vx, expected vf)
        let table = [
            (0x12, 0x34, 0x8120, 0x34, 0x00),
            (0xF0, 0x0F, 0x8121, 0xFF, 0x00),
            (0xF0, 0x3C, 0x8122, 0x30, 0x00),
            (0xFF, 0x0F, 0x8123, 0xF0, 0x00),
            (0xFF, 0x01, 0x8124, 0x00, 0x01),
            (0x10, 0x20, 0x8124, 0x30, 0x00),
            (0x30, 0x10, 0x8125, 0x20, 0x01),
            (0x10, 0x30, 0x8125, 0xE0, 0x00),
            (0x10, 0x10, 0x8125, 0x00, 0x00),
            (0x05, 0x00, 0x8126, 0x02, 0x01),
            (0x04, 0xFF, 0x8126, 0x02, 0x00),
            (0x10, 0x30, 0x8127, 0x20, 0x01),
            (0x30, 0x10, 0x8127, 0xE0, 0x00),
            (0x81, 0x00, 0x812E, 0x02, 0x01),
            (0x41, 0xFF, 0x812E, 0x82, 0x00),
        ];

        for (vx, vy, opcode, expected, flag) in table {
            let mut chip8 = machine();
            regs(&mut chip8, &[(1, vx), (2, vy), (0xF, 0xAA)]);
            run(&mut chip8, opcode).unwrap();
            assert_eq!(chip8.v()[1], expected, "Vx for {opcode:#06X} {vx:#04X} {vy:#04X}");
            assert_eq!(chip8.v()[2], vy, "Vy for {opcode:#06X}");
            let flag = if opcode & 0xF <= 3 { 0xAA } else { flag };
            assert_eq!(chip8.v()[0xF], flag, "VF for {opcode:#06X} {vx:#04X} {vy:#04X}");
        }
    }

    #[test]
    fn flag_wins_when_vf_is_the_target() {
        // (vf, v1, opcode with x=F y=1, expected vf)
        let table = [
            (0xFF, 0x03, 0x8F14, 0x01),
            (0x05, 0x03, 0x8F15, 0x01),
            (0x03, 0x05, 0x8F15, 0x00),
            (0x05, 0x00, 0x8F16, 0x01),
            (0x04, 0x00, 0x8F16, 0x00),
            (0x03, 0x05, 0x8F17, 0x01),
            (0x05, 0x03, 0x8F17, 0x00),
            (0x81, 0x00, 0x8F1E, 0x01),
            (0x41, 0x00, 0x8F1E, 0x00),
        ];

        for (vf, v1, opcode, flag) in table {
            let mut chip8 = machine();
            regs(&mut chip8, &[(0xF, vf), (1, v1)]);
            run(&mut chip8, opcode).unwrap();
            assert_eq!(chip8.v()[0xF], flag, "VF for {opcode:#06X} {vf:#04X} {v1:#04X}");
        }
    }

    #[test]
    fn index_operations() {
        let mut chip8 = machine();
        run(&mut chip8, 0xA123).unwrap();
        assert_eq!(chip8.i(), 0x123);

        regs(&mut chip8, &[(4, 0x10)]);
        run(&mut chip8, 0xF41E).unwrap();
        assert_eq!(chip8.i(), 0x133);

        regs(&mut chip8, &[(4, 0xA)]);
        run(&mut chip8, 0xF429).unwrap();
        assert_eq!(chip8.i(), 0x50 + 50);
    }

    #[test]
    fn random_is_masked() {
        let mut chip8 = machine();
        for _ in 0..64 {
            run(&mut chip8, 0xC30F).unwrap();
            assert_eq!(chip8.v()[3] & 0xF0, 0);
        }
        run(&mut chip8, 0xC300).unwrap();
        assert_eq!(chip8.v()[3], 0);
    }

    #[test]
    fn random_is_reproducible_with_a_seed() {
        let mut a = machine();
        let mut b = machine();
        for _ in 0..8 {
            run(&mut a, 0xC5FF).unwrap();
            run(&mut b, 0xC5FF).unwrap();
            assert_eq!(a.v()[5], b.v()[5]);
        }
    }

    #[test]
    fn draw_font_glyph() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 0), (1, 0)]);
        chip8.set_index(0x50);
        assert_eq!(run(&mut chip8, 0xD015), Ok(Chip8Result::Redraw));

        // Glyph "0" is F0 90 90 90 F0
        let row = |chip8: &Chip8, y| (0..8).map(|x| chip8.get_display_pixel(y, x)).collect::<Vec<_>>();
        let full = [true, true, true, true, false, false, false, false];
        let sides = [true, false, false, true, false, false, false, false];
        assert_eq!(row(&chip8, 0), full);
        assert_eq!(row(&chip8, 1), sides);
        assert_eq!(row(&chip8, 4), full);
        assert_eq!(chip8.v()[0xF], 0);
    }

    #[test]
    fn draw_twice_restores_and_collides() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 10), (1, 5)]);
        chip8.write_memory(0x300, &[0b1010_1010, 0b0101_0101]).unwrap();
        chip8.set_index(0x300);

        run(&mut chip8, 0xD012).unwrap();
        assert_eq!(chip8.v()[0xF], 0);
        assert_eq!(chip8.display().iter().filter(|p| **p).count(), 8);

        run(&mut chip8, 0xD012).unwrap();
        assert_eq!(chip8.v()[0xF], 1);
        assert!(chip8.display().iter().all(|p| !p));
    }

    #[test]
    fn draw_wraps_around_edges() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 60), (1, 30)]);
        chip8.write_memory(0x300, &[0xFF; 4]).unwrap();
        chip8.set_index(0x300);
        run(&mut chip8, 0xD014).unwrap();

        for y in [30, 31, 0, 1] {
            for x in [60, 61, 62, 63, 0, 1, 2, 3] {
                assert!(chip8.get_display_pixel(y, x), "pixel ({x}, {y})");
            }
        }
        assert_eq!(chip8.display().iter().filter(|p| **p).count(), 32);
    }

    #[test]
    fn draw_with_coordinates_past_screen_wraps_start() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 64 + 3), (1, 32 + 2)]);
        chip8.write_memory(0x300, &[0x80]).unwrap();
        chip8.set_index(0x300);
        run(&mut chip8, 0xD011).unwrap();
        assert!(chip8.get_display_pixel(2, 3));
    }

    #[test]
    fn draw_out_of_memory_faults_without_drawing() {
        let mut chip8 = machine();
        chip8.set_index(0xFFE);
        assert_eq!(
            run(&mut chip8, 0xD014),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert!(chip8.display().iter().all(|p| !p));
    }

    #[test]
    fn key_skips() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(2, 0xB)]);
        chip8.set_key(u4::new(0xB));
        run(&mut chip8, 0xE29E).unwrap();
        assert_eq!(chip8.pc(), START + 4);
        run(&mut chip8, 0xE2A1).unwrap();
        assert_eq!(chip8.pc(), START + 6);

        chip8.clear_key(u4::new(0xB));
        run(&mut chip8, 0xE2A1).unwrap();
        assert_eq!(chip8.pc(), START + 10);

        // Vx outside the keypad is never pressed
        regs(&mut chip8, &[(2, 0x1B)]);
        run(&mut chip8, 0xE29E).unwrap();
        assert_eq!(chip8.pc(), START + 12);
    }

    #[test]
    fn wait_for_key_rewinds_until_latched() {
        let mut chip8 = machine();
        assert_eq!(run(&mut chip8, 0xF30A), Ok(Chip8Result::WaitingForKey));
        assert_eq!(chip8.pc(), START);
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::WaitingForKey));
        assert_eq!(chip8.pc(), START);

        chip8.set_key(u4::new(0xC));
        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));
        assert_eq!(chip8.v()[3], 0xC);
        assert_eq!(chip8.pc(), START + 2);
        // The press was consumed
        assert_eq!(chip8.last_key(), None);
        assert!(chip8.is_key_pressed(u4::new(0xC)));
    }

    #[test]
    fn timer_registers() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(1, 30), (2, 40)]);
        run(&mut chip8, 0xF115).unwrap();
        run(&mut chip8, 0xF218).unwrap();
        assert_eq!(chip8.delay_timer(), 30);
        assert_eq!(chip8.sound_timer(), 40);

        chip8.timers_cycle();
        run(&mut chip8, 0xF307).unwrap();
        assert_eq!(chip8.v()[3], 29);
    }

    #[test]
    fn bcd() {
        for (value, digits) in [(157u8, [1u8, 5, 7]), (0, [0, 0, 0]), (255, [2, 5, 5]), (40, [0, 4, 0])] {
            let mut chip8 = machine();
            regs(&mut chip8, &[(6, value)]);
            chip8.set_index(0x400);
            run(&mut chip8, 0xF633).unwrap();
            assert_eq!(&chip8.memory()[0x400..0x403], &digits);
            assert_eq!(chip8.i(), 0x400);
        }
    }

    #[test]
    fn bcd_out_of_memory_faults() {
        let mut chip8 = machine();
        chip8.set_index(0xFFE);
        assert_eq!(
            run(&mut chip8, 0xF033),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert_eq!(&chip8.memory()[0xFFE..], &[0, 0]);
    }

    #[test]
    fn store_and_load_register_block() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        chip8.set_index(0x500);
        run(&mut chip8, 0xF255).unwrap();
        assert_eq!(&chip8.memory()[0x500..0x504], &[1, 2, 3, 0]);
        assert_eq!(chip8.i(), 0x500);

        chip8.write_memory(0x600, &[9, 8, 7, 6]).unwrap();
        chip8.set_index(0x600);
        run(&mut chip8, 0xF165).unwrap();
        assert_eq!(&chip8.v()[..4], &[9, 8, 3, 4]);
        assert_eq!(chip8.i(), 0x600);
    }

    #[test]
    fn register_block_past_memory_faults() {
        let mut chip8 = machine();
        chip8.set_index(0xFF8);
        assert_eq!(
            run(&mut chip8, 0xFF55),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert_eq!(
            run(&mut chip8, 0xFF65),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
    }

    #[test]
    fn unknown_opcode_only_advances_pc() {
        let mut chip8 = machine();
        regs(&mut chip8, &[(0, 1), (1, 2)]);
        chip8.write_memory(0x200, &[0x50, 0x01]).unwrap();
        let (v, i, memory) = (chip8.v, chip8.i, chip8.memory);

        assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::UnknownOpcode(0x5001)));
        assert_eq!(chip8.v, v);
        assert_eq!(chip8.i, i);
        assert_eq!(chip8.memory, memory);
        assert_eq!(chip8.pc(), START + 2);
    }
}
