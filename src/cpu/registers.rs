//! LS-8 CPU registers.
//!
//! The LS-8 has:
//! - R0-R7: eight 8-bit general purpose registers (R7 is the stack pointer)
//! - PC: 8-bit program counter
//! - FL: 1-bit flag holding the result of the last CMP

use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// The register used as the stack pointer.
pub const SP: Reg = Reg(7);

/// Stack pointer value of an empty stack.
pub const EMPTY_STACK: u8 = 0xF4;

/// A validated general purpose register index (0-7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    /// Create a register index, or `None` if it is not 0-7.
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < REGISTER_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The raw index byte.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Iterate over R0..=R7.
    pub fn all() -> impl Iterator<Item = Reg> {
        (0..REGISTER_COUNT as u8).map(Reg)
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// The LS-8 register file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7 general purpose registers.
    pub r: [u8; REGISTER_COUNT],

    /// Program counter: address of the next instruction byte.
    pub pc: u8,

    /// Equal flag, set by CMP and consumed by JEQ/JNE.
    pub fl: bool,
}

impl Registers {
    /// Create a register file in its power-on state.
    pub fn new() -> Self {
        let mut r = [0; REGISTER_COUNT];
        r[SP.0 as usize] = EMPTY_STACK;
        Self { r, pc: 0, fl: false }
    }

    /// Reset all registers to their power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current stack pointer.
    #[inline]
    pub fn sp(&self) -> u8 {
        self[SP]
    }

    /// Set the stack pointer.
    #[inline]
    pub fn set_sp(&mut self, value: u8) {
        self[SP] = value;
    }

    /// The flag as the 0/1 bit it represents.
    #[inline]
    pub fn flag_bit(&self) -> u8 {
        self.fl as u8
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Reg> for Registers {
    type Output = u8;

    #[inline]
    fn index(&self, reg: Reg) -> &u8 {
        &self.r[reg.0 as usize]
    }
}

impl IndexMut<Reg> for Registers {
    #[inline]
    fn index_mut(&mut self, reg: Reg) -> &mut u8 {
        &mut self.r[reg.0 as usize]
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.r.iter().enumerate() {
            write!(f, "R{}={:02x} ", i, value)?;
        }
        write!(f, "PC={:02x} FL={}", self.pc, self.flag_bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reg_bounds() {
        assert_eq!(Reg::new(0).map(Reg::index), Some(0));
        assert_eq!(Reg::new(7).map(Reg::index), Some(7));
        assert!(Reg::new(8).is_none());
        assert!(Reg::new(0xFF).is_none());
        assert_eq!(Reg::all().count(), 8);
    }

    #[test]
    fn test_power_on_state() {
        let regs = Registers::new();

        assert_eq!(regs.sp(), EMPTY_STACK);
        assert_eq!(regs.pc, 0);
        assert!(!regs.fl);
        for reg in Reg::all().filter(|&r| r != SP) {
            assert_eq!(regs[reg], 0);
        }
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.r = [9; REGISTER_COUNT];
        regs.pc = 0x40;
        regs.fl = true;

        regs.reset();

        assert_eq!(regs, Registers::new());
    }

    #[test]
    fn test_index_by_reg() {
        let mut regs = Registers::new();
        let r3 = Reg::new(3).unwrap();

        regs[r3] = 200;
        assert_eq!(regs.r[3], 200);
        assert_eq!(regs[r3], 200);
    }
}
