//! Program files, assembler and disassembler for the LS-8.
//!
//! This module provides:
//! - The `.ls8` loader and writer (one binary-digit byte per line)
//! - A simple two-pass assembler (text → machine code)
//! - A disassembler (machine code → readable text)

pub mod assembler;
pub mod disasm;
pub mod ls8;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{annotate, disassemble};
pub use ls8::{Ls8File, LoadError, load_ls8, parse_ls8, save_ls8};
