use std::{
    fmt,
    ops::{Index, IndexMut},
};

use crate::emu::Chip8Error;

/// A 4-bit unsigned integer (nibble).
///
/// Used for register selectors and keypad codes, so it can index any `[T; 16]` directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub struct u4(u8);

impl u4 {
    /// Creates a new `u4` from a `u8`.
    ///
    /// Panics if the value is greater than 0x0F.
    pub const fn new(value: u8) -> Self {
        assert!(value <= 0x0F, "u4 value must be in range 0x0-0xF");
        Self(value)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for u4 {
    type Error = Chip8Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 0x0F {
            Ok(Self(value))
        } else {
            Err(Chip8Error::InvalidKey { key: value })
        }
    }
}

impl From<u4> for usize {
    fn from(v: u4) -> usize {
        v.0 as usize
    }
}

impl From<u4> for u8 {
    fn from(v: u4) -> u8 {
        v.0
    }
}

impl fmt::Display for u4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl<T> Index<u4> for [T; 16] {
    type Output = T;

    fn index(&self, index: u4) -> &Self::Output {
        &self[index.0 as usize]
    }
}

impl<T> IndexMut<u4> for [T; 16] {
    fn index_mut(&mut self, index: u4) -> &mut Self::Output {
        &mut self[index.0 as usize]
    }
}
