//! Instruction decoder for the LS-8.
//!
//! An instruction is one opcode byte followed by up to two operand bytes.
//! The opcode byte's high bits happen to carry the operand count (bits 6-7)
//! and a "sets PC" marker (bit 4), but the decoder does not read them:
//! everything it needs comes from [`OPCODE_TABLE`].

use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// How an operand byte is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A register index, 0-7.
    Reg,
    /// A literal byte.
    Imm,
}

/// The LS-8 opcodes.
///
/// Discriminants index into [`OPCODE_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Ldi,
    Prn,
    Pra,
    Mul,
    Add,
    Push,
    Pop,
    Cmp,
    Jmp,
    Jeq,
    Jne,
    Hlt,
}

/// Static metadata for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub byte: u8,
    pub mnemonic: &'static str,
    pub operands: &'static [OperandKind],
    /// The instruction writes PC itself; the loop must not auto-advance.
    pub sets_pc: bool,
}

impl OpcodeInfo {
    /// Number of operand bytes.
    #[inline]
    pub const fn operand_count(&self) -> u8 {
        self.operands.len() as u8
    }

    /// Encoded size in bytes, opcode included.
    #[inline]
    pub const fn size(&self) -> u8 {
        self.operand_count() + 1
    }
}

use OperandKind::{Imm, Reg as R};

/// Opcode metadata, in [`Opcode`] discriminant order.
pub static OPCODE_TABLE: [OpcodeInfo; 12] = [
    OpcodeInfo { opcode: Opcode::Ldi,  byte: 0b1000_0010, mnemonic: "LDI",  operands: &[R, Imm], sets_pc: false },
    OpcodeInfo { opcode: Opcode::Prn,  byte: 0b0100_0111, mnemonic: "PRN",  operands: &[R],      sets_pc: false },
    OpcodeInfo { opcode: Opcode::Pra,  byte: 0b0100_1000, mnemonic: "PRA",  operands: &[R],      sets_pc: false },
    OpcodeInfo { opcode: Opcode::Mul,  byte: 0b1010_0010, mnemonic: "MUL",  operands: &[R, R],   sets_pc: false },
    OpcodeInfo { opcode: Opcode::Add,  byte: 0b1010_0000, mnemonic: "ADD",  operands: &[R, R],   sets_pc: false },
    OpcodeInfo { opcode: Opcode::Push, byte: 0b0100_0101, mnemonic: "PUSH", operands: &[R],      sets_pc: false },
    OpcodeInfo { opcode: Opcode::Pop,  byte: 0b0100_0110, mnemonic: "POP",  operands: &[R],      sets_pc: false },
    OpcodeInfo { opcode: Opcode::Cmp,  byte: 0b1010_0111, mnemonic: "CMP",  operands: &[R, R],   sets_pc: false },
    OpcodeInfo { opcode: Opcode::Jmp,  byte: 0b0101_0100, mnemonic: "JMP",  operands: &[R],      sets_pc: true },
    OpcodeInfo { opcode: Opcode::Jeq,  byte: 0b0101_0101, mnemonic: "JEQ",  operands: &[R],      sets_pc: true },
    OpcodeInfo { opcode: Opcode::Jne,  byte: 0b0101_0110, mnemonic: "JNE",  operands: &[R],      sets_pc: true },
    OpcodeInfo { opcode: Opcode::Hlt,  byte: 0b0000_0001, mnemonic: "HLT",  operands: &[],       sets_pc: false },
];

impl Opcode {
    /// Metadata for this opcode.
    #[inline]
    pub fn info(self) -> &'static OpcodeInfo {
        &OPCODE_TABLE[self as usize]
    }

    /// The encoded opcode byte.
    #[inline]
    pub fn byte(self) -> u8 {
        self.info().byte
    }

    /// Look up an opcode by its encoded byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        OPCODE_TABLE.iter().find(|info| info.byte == byte).map(|info| info.opcode)
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        OPCODE_TABLE
            .iter()
            .find(|info| info.mnemonic.eq_ignore_ascii_case(mnemonic))
            .map(|info| info.opcode)
    }
}

/// Decoded LS-8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Load immediate: reg := imm
    Ldi { reg: Reg, imm: u8 },
    /// Print register as decimal
    Prn { reg: Reg },
    /// Print register as a character
    Pra { reg: Reg },
    /// a := a * b
    Mul { a: Reg, b: Reg },
    /// a := a + b
    Add { a: Reg, b: Reg },
    /// Push register onto the stack
    Push { reg: Reg },
    /// Pop the stack into a register
    Pop { reg: Reg },
    /// FL := a == b
    Cmp { a: Reg, b: Reg },
    /// PC := reg
    Jmp { reg: Reg },
    /// if FL then PC := reg
    Jeq { reg: Reg },
    /// if !FL then PC := reg
    Jne { reg: Reg },
    /// Halt execution
    Hlt,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Prn { .. } => Opcode::Prn,
            Instruction::Pra { .. } => Opcode::Pra,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Pop { .. } => Opcode::Pop,
            Instruction::Cmp { .. } => Opcode::Cmp,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jeq { .. } => Opcode::Jeq,
            Instruction::Jne { .. } => Opcode::Jne,
            Instruction::Hlt => Opcode::Hlt,
        }
    }

    #[inline]
    pub fn info(&self) -> &'static OpcodeInfo {
        self.opcode().info()
    }

    /// Encoded size in bytes.
    #[inline]
    pub fn size(&self) -> u8 {
        self.info().size()
    }

    /// Operand bytes in encoding order.
    fn operand_bytes(&self) -> ([u8; 2], usize) {
        match *self {
            Instruction::Ldi { reg, imm } => ([reg.index(), imm], 2),
            Instruction::Prn { reg }
            | Instruction::Pra { reg }
            | Instruction::Push { reg }
            | Instruction::Pop { reg }
            | Instruction::Jmp { reg }
            | Instruction::Jeq { reg }
            | Instruction::Jne { reg } => ([reg.index(), 0], 1),
            Instruction::Mul { a, b }
            | Instruction::Add { a, b }
            | Instruction::Cmp { a, b } => ([a.index(), b.index()], 2),
            Instruction::Hlt => ([0, 0], 0),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.info().mnemonic;
        match *self {
            Instruction::Ldi { reg, imm } => write!(f, "{} {},{}", mnemonic, reg, imm),
            Instruction::Prn { reg }
            | Instruction::Pra { reg }
            | Instruction::Push { reg }
            | Instruction::Pop { reg }
            | Instruction::Jmp { reg }
            | Instruction::Jeq { reg }
            | Instruction::Jne { reg } => write!(f, "{} {}", mnemonic, reg),
            Instruction::Mul { a, b }
            | Instruction::Add { a, b }
            | Instruction::Cmp { a, b } => write!(f, "{} {},{}", mnemonic, a, b),
            Instruction::Hlt => f.write_str(mnemonic),
        }
    }
}

/// Decode an instruction from its opcode byte and the two bytes after it.
///
/// Both operand bytes are always supplied; those the opcode does not use
/// are ignored.
pub fn decode(ir: u8, operand_a: u8, operand_b: u8) -> Result<Instruction, DecodeError> {
    let opcode = Opcode::from_byte(ir).ok_or(DecodeError::UnknownOpcode(ir))?;

    let reg = |byte: u8| Reg::new(byte).ok_or(DecodeError::InvalidRegister(byte));

    let instruction = match opcode {
        Opcode::Ldi => Instruction::Ldi { reg: reg(operand_a)?, imm: operand_b },
        Opcode::Prn => Instruction::Prn { reg: reg(operand_a)? },
        Opcode::Pra => Instruction::Pra { reg: reg(operand_a)? },
        Opcode::Mul => Instruction::Mul { a: reg(operand_a)?, b: reg(operand_b)? },
        Opcode::Add => Instruction::Add { a: reg(operand_a)?, b: reg(operand_b)? },
        Opcode::Push => Instruction::Push { reg: reg(operand_a)? },
        Opcode::Pop => Instruction::Pop { reg: reg(operand_a)? },
        Opcode::Cmp => Instruction::Cmp { a: reg(operand_a)?, b: reg(operand_b)? },
        Opcode::Jmp => Instruction::Jmp { reg: reg(operand_a)? },
        Opcode::Jeq => Instruction::Jeq { reg: reg(operand_a)? },
        Opcode::Jne => Instruction::Jne { reg: reg(operand_a)? },
        Opcode::Hlt => Instruction::Hlt,
    };

    Ok(instruction)
}

/// Encode an instruction to its 1-3 bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let (operands, count) = instr.operand_bytes();
    let mut bytes = Vec::with_capacity(count + 1);
    bytes.push(instr.opcode().byte());
    bytes.extend_from_slice(&operands[..count]);
    bytes
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("invalid register: {0}")]
    InvalidRegister(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(i: u8) -> Reg {
        Reg::new(i).unwrap()
    }

    #[test]
    fn test_table_order_matches_discriminants() {
        for (i, info) in OPCODE_TABLE.iter().enumerate() {
            assert_eq!(info.opcode as usize, i, "{} out of order", info.mnemonic);
        }
    }

    #[test]
    fn test_table_agrees_with_bit_layout() {
        // Operand count lives in bits 6-7, the PC-setting marker in bit 4
        for info in &OPCODE_TABLE {
            assert_eq!(info.byte >> 6, info.operand_count(), "{}", info.mnemonic);
            assert_eq!((info.byte >> 4) & 1 == 1, info.sets_pc, "{}", info.mnemonic);
        }
    }

    #[test]
    fn test_opcode_bytes_are_unique() {
        for a in &OPCODE_TABLE {
            let same = OPCODE_TABLE.iter().filter(|b| b.byte == a.byte).count();
            assert_eq!(same, 1, "{} shares its byte", a.mnemonic);
        }
    }

    #[test]
    fn test_decode_hlt() {
        assert_eq!(decode(0x01, 0xFF, 0xFF), Ok(Instruction::Hlt));
    }

    #[test]
    fn test_decode_ldi() {
        let instr = decode(0x82, 3, 200).unwrap();
        assert_eq!(instr, Instruction::Ldi { reg: reg(3), imm: 200 });
        assert_eq!(instr.size(), 3);
    }

    #[test]
    fn test_decode_ignores_unused_operand() {
        // PRN uses one operand; the second byte may be anything, even an opcode
        assert_eq!(decode(0x47, 0, 0xFF), Ok(Instruction::Prn { reg: reg(0) }));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(decode(0x00, 0, 0), Err(DecodeError::UnknownOpcode(0x00)));
        assert_eq!(decode(0xFF, 0, 0), Err(DecodeError::UnknownOpcode(0xFF)));
    }

    #[test]
    fn test_decode_invalid_register() {
        assert_eq!(decode(0x47, 8, 0), Err(DecodeError::InvalidRegister(8)));
        assert_eq!(decode(0xA2, 1, 0x40), Err(DecodeError::InvalidRegister(0x40)));
    }

    #[test]
    fn test_every_known_byte_decodes_or_rejects_only_registers() {
        for byte in 0..=255u8 {
            match decode(byte, 0, 1) {
                Ok(instr) => assert_eq!(instr.opcode().byte(), byte),
                Err(e) => assert_eq!(e, DecodeError::UnknownOpcode(byte)),
            }
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let test_cases = [
            Instruction::Hlt,
            Instruction::Ldi { reg: reg(0), imm: 8 },
            Instruction::Mul { a: reg(0), b: reg(1) },
            Instruction::Jeq { reg: reg(7) },
        ];

        for instr in test_cases {
            let bytes = encode(&instr);
            assert_eq!(bytes.len(), instr.size() as usize);

            let get = |i: usize| bytes.get(i).copied().unwrap_or(0);
            assert_eq!(decode(get(0), get(1), get(2)), Ok(instr));
        }
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(Opcode::from_mnemonic("ldi"), Some(Opcode::Ldi));
        assert_eq!(Opcode::from_mnemonic("JNE"), Some(Opcode::Jne));
        assert_eq!(Opcode::from_mnemonic("NOP"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Ldi { reg: reg(0), imm: 8 }.to_string(), "LDI R0,8");
        assert_eq!(Instruction::Cmp { a: reg(1), b: reg(2) }.to_string(), "CMP R1,R2");
        assert_eq!(Instruction::Push { reg: reg(4) }.to_string(), "PUSH R4");
        assert_eq!(Instruction::Hlt.to_string(), "HLT");
    }
}
