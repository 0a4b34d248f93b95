//! Arithmetic/logic unit and the overflow policy.
//!
//! Every piece of 8-bit arithmetic that may leave the 0-255 range goes
//! through [`OverflowMode`], so the silent wraparound of the LS-8 can be
//! swapped for a trapping variant without touching instruction dispatch.

use crate::cpu::registers::{Reg, Registers};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// What to do when an 8-bit result does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    /// Wrap modulo 256.
    #[default]
    Wrap,
    /// Report an [`Overflow`].
    Trap,
}

/// Arithmetic operations subject to the overflow policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "subtract",
            ArithOp::Mul => "multiply",
        };
        f.write_str(name)
    }
}

/// An 8-bit result that did not fit, reported in [`OverflowMode::Trap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} overflow: {lhs} and {rhs}")]
pub struct Overflow {
    pub op: ArithOp,
    pub lhs: u8,
    pub rhs: u8,
}

impl OverflowMode {
    /// Apply `op` to two bytes under this policy.
    pub fn apply(self, op: ArithOp, lhs: u8, rhs: u8) -> Result<u8, Overflow> {
        let (value, overflowed) = match op {
            ArithOp::Add => lhs.overflowing_add(rhs),
            ArithOp::Sub => lhs.overflowing_sub(rhs),
            ArithOp::Mul => lhs.overflowing_mul(rhs),
        };

        match self {
            OverflowMode::Trap if overflowed => Err(Overflow { op, lhs, rhs }),
            _ => Ok(value),
        }
    }

    #[inline]
    pub fn add(self, lhs: u8, rhs: u8) -> Result<u8, Overflow> {
        self.apply(ArithOp::Add, lhs, rhs)
    }

    #[inline]
    pub fn sub(self, lhs: u8, rhs: u8) -> Result<u8, Overflow> {
        self.apply(ArithOp::Sub, lhs, rhs)
    }

    #[inline]
    pub fn mul(self, lhs: u8, rhs: u8) -> Result<u8, Overflow> {
        self.apply(ArithOp::Mul, lhs, rhs)
    }
}

/// Operation selector for [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Mul,
    Add,
}

/// Register-to-register arithmetic: `dest = dest <op> src`.
///
/// Only `dest` is modified. On a trapped overflow nothing is written.
pub fn apply(
    regs: &mut Registers,
    mode: OverflowMode,
    op: AluOp,
    dest: Reg,
    src: Reg,
) -> Result<(), Overflow> {
    let value_b = regs[src];
    let value_a = regs[dest];

    regs[dest] = match op {
        AluOp::Mul => mode.mul(value_a, value_b)?,
        AluOp::Add => mode.add(value_a, value_b)?,
    };

    Ok(())
}
