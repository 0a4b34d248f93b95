//! Two-pass assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment (`#` works too)
//! LOOP:               ; Define a label
//!     LDI R0, 8       ; Register and immediate operands
//!     LDI R1, LOOP    ; Labels are immediates
//!     JMP R1
//!     HLT
//!
//!     ORG 0x40        ; Pad with zeros up to an address
//!     DB 0x41, 10     ; Data bytes
//! ```
//!
//! Immediates may be decimal, `0x` hex, `0b` binary or a label.

use crate::cpu::decode::{OperandKind, Opcode};
use crate::cpu::memory::MEMORY_SIZE;
use crate::cpu::registers::Reg;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a byte image loaded at address 0.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, u8>,
    /// Unresolved label references: (output index, label, source line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes; the current address is its length.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        if self.output.len() > MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { size: self.output.len() });
        }

        // Pass 2: Patch label references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find([';', '#']) {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            self.define_label(label, line_num)?;

            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn define_label(&mut self, label: String, line_num: usize) -> Result<(), AssemblerError> {
        let valid = label.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid label name '{}'", label),
            });
        }

        let addr = self.current_addr(line_num)?;
        if self.symbols.insert(label.clone(), addr).is_some() {
            return Err(AssemblerError::DuplicateLabel { line: line_num, label });
        }
        Ok(())
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), rest),
            None => (line.to_uppercase(), ""),
        };
        let operands: Vec<&str> = rest
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [operand] = operands.as_slice() else {
                    return Err(AssemblerError::OperandCount { line: line_num, expected: 1, found: operands.len() });
                };
                let target = self.parse_number(operand, line_num)?.ok_or_else(|| {
                    AssemblerError::SyntaxError { line: line_num, message: "ORG requires a numeric address".into() }
                })?;
                if target < self.output.len() as i64 || target >= MEMORY_SIZE as i64 {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: target });
                }
                self.output.resize(target as usize, 0);
            }

            "DB" | "DATA" => {
                if operands.is_empty() {
                    return Err(AssemblerError::OperandCount { line: line_num, expected: 1, found: 0 });
                }
                for operand in operands {
                    self.emit_immediate(operand, line_num)?;
                }
            }

            // Instructions
            _ => {
                let opcode = Opcode::from_mnemonic(&mnemonic).ok_or_else(|| {
                    AssemblerError::UnknownMnemonic { line: line_num, mnemonic: mnemonic.clone() }
                })?;
                let info = opcode.info();

                if operands.len() != info.operands.len() {
                    return Err(AssemblerError::OperandCount {
                        line: line_num,
                        expected: info.operands.len(),
                        found: operands.len(),
                    });
                }

                self.output.push(info.byte);
                for (operand, kind) in operands.iter().zip(info.operands) {
                    match kind {
                        OperandKind::Reg => {
                            let reg = parse_register(operand, line_num)?;
                            self.output.push(reg.index());
                        }
                        OperandKind::Imm => self.emit_immediate(operand, line_num)?,
                    }
                }
            }
        }

        Ok(())
    }

    /// Emit one immediate byte, deferring labels to pass 2.
    fn emit_immediate(&mut self, operand: &str, line_num: usize) -> Result<(), AssemblerError> {
        match self.parse_number(operand, line_num)? {
            Some(value) => {
                let byte = to_byte(value).ok_or(AssemblerError::ValueOutOfRange { line: line_num, value })?;
                self.output.push(byte);
            }
            None => {
                self.pending.push((self.output.len(), operand.to_uppercase(), line_num));
                self.output.push(0); // Placeholder, patched in pass 2
            }
        }
        Ok(())
    }

    /// Parse a numeric literal. `Ok(None)` means the operand is a label.
    fn parse_number(&self, operand: &str, line_num: usize) -> Result<Option<i64>, AssemblerError> {
        let invalid = |radix: &str| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid {} literal '{}'", radix, operand),
        };

        let lower = operand.to_ascii_lowercase();
        if let Some(hex) = lower.strip_prefix("0x") {
            return i64::from_str_radix(hex, 16).map(Some).map_err(|_| invalid("hex"));
        }
        if let Some(bin) = lower.strip_prefix("0b") {
            return i64::from_str_radix(bin, 2).map(Some).map_err(|_| invalid("binary"));
        }
        if operand.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            return operand.parse::<i64>().map(Some).map_err(|_| invalid("decimal"));
        }

        Ok(None)
    }

    fn current_addr(&self, line_num: usize) -> Result<u8, AssemblerError> {
        u8::try_from(self.output.len()).map_err(|_| AssemblerError::SyntaxError {
            line: line_num,
            message: "label past end of memory".into(),
        })
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line: *line_num,
                label: label.clone(),
            })?;
            self.output[*out_idx] = *addr;
        }
        Ok(())
    }
}

/// Parse `R0`..`R7`.
fn parse_register(operand: &str, line_num: usize) -> Result<Reg, AssemblerError> {
    operand
        .strip_prefix(['R', 'r'])
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(Reg::new)
        .ok_or_else(|| AssemblerError::InvalidRegister { line: line_num, operand: operand.to_string() })
}

/// Accept 0..=255, and -128..=-1 as two's complement.
fn to_byte(value: i64) -> Option<u8> {
    match value {
        0..=255 => Some(value as u8),
        -128..=-1 => Some(value as i8 as u8),
        _ => None,
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: {operand}")]
    InvalidRegister { line: usize, operand: String },

    #[error("wrong operand count on line {line}: expected {expected}, found {found}")]
    OperandCount { line: usize, expected: usize, found: usize },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program of {size} bytes does not fit in memory")]
    ProgramTooLarge { size: usize },
}
