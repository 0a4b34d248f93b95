//! LS-8 memory subsystem.
//!
//! 256 byte-wide cells addressed by a single byte, so every address is
//! in range and all address arithmetic wraps modulo 256.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 256;

/// Address of the first program byte.
pub const PROGRAM_ENTRY: u8 = 0x00;

/// LS-8 memory: 256 eight-bit cells.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(deserialize_with = "deserialize_cells")]
    cells: Vec<u8>,
}

/// Reject snapshots whose image is not exactly one full memory.
fn deserialize_cells<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let cells = Vec::<u8>::deserialize(deserializer)?;
    if cells.len() != MEMORY_SIZE {
        return Err(serde::de::Error::invalid_length(cells.len(), &"256 memory cells"));
    }
    Ok(cells)
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, addr: u8) -> u8 {
        self.cells[addr as usize]
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: u8, value: u8) {
        self.cells[addr as usize] = value;
    }

    /// Read the byte `offset` cells past `addr`, wrapping at the end of memory.
    #[inline]
    pub fn read_offset(&self, addr: u8, offset: u8) -> u8 {
        self.read(addr.wrapping_add(offset))
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Load a program into memory starting at the given address.
    ///
    /// The image must fit between `start_addr` and the end of memory; a
    /// program that would wrap around onto address 0 is rejected.
    pub fn load_program(&mut self, start_addr: u8, program: &[u8]) -> Result<(), MemoryError> {
        let start = start_addr as usize;
        if start + program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: MEMORY_SIZE - start,
            });
        }

        self.cells[start..start + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: u8, count: usize) -> Vec<(u8, u8)> {
        let end = (start as usize + count).min(MEMORY_SIZE);
        (start as usize..end)
            .map(|i| (i as u8, self.cells[i]))
            .collect()
    }

    /// The whole memory image.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show non-zero cells
        let non_zero = self.cells.iter().filter(|cell| **cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
