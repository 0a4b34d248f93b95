//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a small eight-bit computer with 256 bytes of
//! memory, eight registers and a twelve-instruction set. It is used to
//! teach how a fetch-decode-execute loop works.

pub mod cpu;
pub mod asm;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Reg, Instruction, Opcode, OverflowMode};
pub use asm::{assemble, disassemble, AssemblerError, Ls8File, LoadError, load_ls8, save_ls8};
pub use config::{MachineConfig, ConfigError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
