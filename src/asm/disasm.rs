//! Disassembler for LS-8 programs.
//!
//! Converts machine code back to readable assembly with a linear sweep.
//! Bytes that do not decode are shown as `DB` data.

use crate::asm::ls8::Ls8File;
use crate::cpu::Memory;
use crate::cpu::decode::decode;

/// One disassembled instruction or data byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    /// Address of the first byte.
    pub addr: usize,
    /// The bytes this line covers.
    pub bytes: Vec<u8>,
    /// Assembly text.
    pub text: String,
}

/// Disassemble one instruction from its opcode byte and the two bytes after
/// it. Returns the text and the number of bytes consumed.
pub fn disassemble_instruction(ir: u8, operand_a: u8, operand_b: u8) -> (String, u8) {
    match decode(ir, operand_a, operand_b) {
        Ok(instr) => (instr.to_string(), instr.size()),
        Err(_) => (format!("DB {:#04x}", ir), 1),
    }
}

/// Disassemble the instruction at `pc` in memory, wrapping like the CPU's
/// own fetch.
pub fn disassemble_at(mem: &Memory, pc: u8) -> (String, u8) {
    disassemble_instruction(mem.read(pc), mem.read_offset(pc, 1), mem.read_offset(pc, 2))
}

/// Linear-sweep listing of a byte image starting at address 0.
pub fn listing(bytes: &[u8]) -> Vec<ListingLine> {
    let mut lines = Vec::new();
    let mut addr = 0;

    while addr < bytes.len() {
        let get = |i: usize| bytes.get(i).copied().unwrap_or(0);
        let (mut text, mut size) = disassemble_instruction(get(addr), get(addr + 1), get(addr + 2));

        // An instruction cut off by the end of the image is data
        if addr + size as usize > bytes.len() {
            text = format!("DB {:#04x}", bytes[addr]);
            size = 1;
        }

        let end = addr + size as usize;
        lines.push(ListingLine { addr, bytes: bytes[addr..end].to_vec(), text });
        addr = end;
    }

    lines
}

/// Disassemble a byte image.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; -----------------\n\n");

    for line in listing(bytes) {
        let hex: Vec<String> = line.bytes.iter().map(|b| format!("{:02x}", b)).collect();
        output.push_str(&format!("{:02x}: {:<12}  ; {}\n", line.addr, line.text, hex.join(" ")));
    }

    output
}

/// Build an `.ls8` image whose opcode bytes are commented with their
/// disassembly.
pub fn annotate(bytes: &[u8]) -> Ls8File {
    let mut program = Ls8File::new();

    for line in listing(bytes) {
        for (i, &byte) in line.bytes.iter().enumerate() {
            program.push(byte, if i == 0 { line.text.as_str() } else { "" });
        }
    }

    program
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRINT8: [u8; 6] = [0x82, 0x00, 0x08, 0x47, 0x00, 0x01];

    #[test]
    fn test_disassemble_hlt() {
        assert_eq!(disassemble_instruction(0x01, 0, 0), ("HLT".to_string(), 1));
    }

    #[test]
    fn test_disassemble_unknown() {
        assert_eq!(disassemble_instruction(0xFF, 0, 0), ("DB 0xff".to_string(), 1));
        // Bad register operand is data too
        assert_eq!(disassemble_instruction(0x47, 0x10, 0).1, 1);
    }

    #[test]
    fn test_listing() {
        let lines = listing(&PRINT8);

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "LDI R0,8");
        assert_eq!(lines[1].addr, 3);
        assert_eq!(lines[1].text, "PRN R0");
        assert_eq!(lines[2].text, "HLT");
    }

    #[test]
    fn test_truncated_instruction_is_data() {
        let lines = listing(&[0x82, 0x00]);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "DB 0x82");
        assert_eq!(lines[1].text, "DB 0x00");
    }

    #[test]
    fn test_disassemble_at_wraps() {
        let mut mem = Memory::new();
        mem.write(0xFF, 0x47);
        mem.write(0x00, 0x03);

        assert_eq!(disassemble_at(&mem, 0xFF), ("PRN R3".to_string(), 2));
    }

    #[test]
    fn test_annotate() {
        let program = annotate(&PRINT8);

        assert_eq!(program.bytes, PRINT8.to_vec());
        assert_eq!(program.source_lines[0], "LDI R0,8");
        assert_eq!(program.source_lines[1], "");
        assert_eq!(program.source_lines[3], "PRN R0");
    }

    #[test]
    fn test_disassemble_text() {
        let text = disassemble(&PRINT8);
        assert!(text.contains("00: LDI R0,8"));
        assert!(text.contains("05: HLT"));
    }
}
