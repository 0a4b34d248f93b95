//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 machine:
//! - 256 eight-bit memory cells with wraparound addressing
//! - 8 general purpose registers (R7 doubles as the stack pointer), PC and FL
//! - 12-instruction set, one opcode byte plus up to two operand bytes

pub mod memory;
pub mod registers;
pub mod alu;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use registers::{Reg, Registers};
pub use alu::{AluOp, Overflow, OverflowMode};
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{Cpu, CpuError, CpuState};
