//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::config::MachineConfig;
use crate::cpu::{Memory, Registers};
use crate::cpu::alu::{self, AluOp, Overflow, OverflowMode};
use crate::cpu::decode::{self, DecodeError, Instruction};
use crate::cpu::memory::{MemoryError, PROGRAM_ENTRY};
use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use std::io::Write;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// CPU stopped on a fatal error.
    Error,
}

/// The LS-8 CPU.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// Arithmetic overflow policy.
    pub overflow: OverflowMode,
    /// Last executed instruction (for debugging).
    #[serde(skip)]
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU in its power-on state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            overflow: OverflowMode::default(),
            last_instr: None,
        }
    }

    /// Create a CPU configured by `config`.
    pub fn with_config(config: &MachineConfig) -> Self {
        Self {
            overflow: config.overflow,
            ..Self::new()
        }
    }

    /// Reset the CPU to its power-on state, keeping the overflow policy.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
        debug!("cpu reset");
    }

    /// Load a program at the program entry address.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.load_program_at(PROGRAM_ENTRY, program)
    }

    /// Load a program at an arbitrary base address.
    pub fn load_program_at(&mut self, base: u8, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(base, program)?;
        debug!(base, bytes = program.len(), "program loaded");
        Ok(())
    }

    /// Push a byte onto the stack: decrement SP, then store.
    pub fn push(&mut self, value: u8) -> Result<(), Overflow> {
        let sp = self.overflow.sub(self.regs.sp(), 1)?;
        self.regs.set_sp(sp);
        self.mem.write(sp, value);
        Ok(())
    }

    /// Pop a byte from the stack: load, then increment SP.
    pub fn pop(&mut self) -> Result<u8, Overflow> {
        let sp = self.regs.sp();
        let value = self.mem.read(sp);
        self.regs.set_sp(self.overflow.add(sp, 1)?);
        Ok(value)
    }

    /// Execute a single instruction.
    ///
    /// PRN/PRA output goes to `out`. Returns the instruction that was
    /// executed, or an error; a fatal error leaves the CPU in
    /// [`CpuState::Error`].
    pub fn step<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.regs.pc;
        let result = self.cycle(pc, out);

        match result {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                if self.state == CpuState::Halted {
                    info!(pc, cycles = self.cycles, "halted");
                }
                Ok(instr)
            }
            Err(e) => {
                self.state = CpuState::Error;
                warn!(pc, error = %e, "cpu stopped");
                Err(e)
            }
        }
    }

    /// One fetch-decode-execute cycle for the instruction at `pc`.
    fn cycle<W: Write + ?Sized>(&mut self, pc: u8, out: &mut W) -> Result<Instruction, CpuError> {
        // Fetch: both operand bytes are read whether or not they are used
        let ir = self.mem.read(pc);
        let operand_a = self.mem.read_offset(pc, 1);
        let operand_b = self.mem.read_offset(pc, 2);

        // Decode
        let instr = decode::decode(ir, operand_a, operand_b)
            .map_err(|e| CpuError::from_decode(pc, e))?;
        trace!(pc, ir, instr = %instr, "execute");

        // Execute
        self.execute(pc, instr, out)?;

        let info = instr.info();
        if !info.sets_pc && self.state == CpuState::Running {
            self.regs.pc = pc.wrapping_add(info.size());
        }

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed. A program that never
    /// reaches HLT never returns; use [`Cpu::run_limited`] to bound it.
    pub fn run<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited<W: Write + ?Sized>(&mut self, out: &mut W, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction fetched from `pc`.
    fn execute<W: Write + ?Sized>(&mut self, pc: u8, instr: Instruction, out: &mut W) -> Result<(), CpuError> {
        let overflow = |source| CpuError::Overflow { pc, source };

        match instr {
            Instruction::Ldi { reg, imm } => {
                self.regs[reg] = imm;
            }

            Instruction::Prn { reg } => {
                writeln!(out, "{}", self.regs[reg])?;
            }

            Instruction::Pra { reg } => {
                // The raw byte, not its UTF-8 encoding
                out.write_all(&[self.regs[reg], b'\n'])?;
            }

            Instruction::Mul { a, b } => {
                alu::apply(&mut self.regs, self.overflow, AluOp::Mul, a, b).map_err(overflow)?;
            }

            Instruction::Add { a, b } => {
                alu::apply(&mut self.regs, self.overflow, AluOp::Add, a, b).map_err(overflow)?;
            }

            Instruction::Push { reg } => {
                let value = self.regs[reg];
                self.push(value).map_err(overflow)?;
            }

            Instruction::Pop { reg } => {
                let value = self.pop().map_err(overflow)?;
                self.regs[reg] = value;
            }

            Instruction::Cmp { a, b } => {
                self.regs.fl = self.regs[a] == self.regs[b];
            }

            Instruction::Jmp { reg } => {
                self.regs.jump(self.regs[reg]);
            }

            Instruction::Jeq { reg } => {
                self.branch(pc, instr, reg, self.regs.fl);
            }

            Instruction::Jne { reg } => {
                self.branch(pc, instr, reg, !self.regs.fl);
            }

            Instruction::Hlt => {
                self.state = CpuState::Halted;
            }
        }

        Ok(())
    }

    /// Conditional jump. The loop never advances PC for a branch, so the
    /// not-taken path steps over the instruction here.
    fn branch(&mut self, pc: u8, instr: Instruction, target: Reg, taken: bool) {
        if taken {
            self.regs.jump(self.regs[target]);
        } else {
            self.regs.jump(pc.wrapping_add(instr.size()));
        }
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("PC {pc:02x}: unknown instruction {opcode:02x}")]
    UnknownOpcode { pc: u8, opcode: u8 },

    #[error("PC {pc:02x}: invalid register {register}")]
    InvalidRegister { pc: u8, register: u8 },

    #[error("PC {pc:02x}: {source}")]
    Overflow { pc: u8, source: Overflow },

    #[error("output error: {0}")]
    Output(String),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl CpuError {
    fn from_decode(pc: u8, e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownOpcode(opcode) => CpuError::UnknownOpcode { pc, opcode },
            DecodeError::InvalidRegister(register) => CpuError::InvalidRegister { pc, register },
        }
    }
}

impl From<std::io::Error> for CpuError {
    fn from(e: std::io::Error) -> Self {
        CpuError::Output(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::{EMPTY_STACK, SP};

    fn reg(i: u8) -> Reg {
        Reg::new(i).unwrap()
    }

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    fn run_program(instructions: &[Instruction]) -> (Cpu, String) {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(instructions)).unwrap();
        let mut out: Vec<u8> = Vec::new();
        cpu.run_limited(&mut out, 1_000).unwrap();
        (cpu, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cpu_halt() {
        let (cpu, out) = run_program(&[Instruction::Hlt]);

        assert_eq!(cpu.cycles, 1);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_ldi_prn() {
        let (_, out) = run_program(&[
            Instruction::Ldi { reg: reg(2), imm: 255 },
            Instruction::Prn { reg: reg(2) },
            Instruction::Hlt,
        ]);

        assert_eq!(out, "255\n");
    }

    #[test]
    fn test_mult_program() {
        let (cpu, out) = run_program(&[
            Instruction::Ldi { reg: reg(0), imm: 8 },
            Instruction::Ldi { reg: reg(1), imm: 9 },
            Instruction::Mul { a: reg(0), b: reg(1) },
            Instruction::Prn { reg: reg(0) },
            Instruction::Hlt,
        ]);

        assert_eq!(out, "72\n");
        assert_eq!(cpu.state, CpuState::Halted);
        assert_eq!(cpu.cycles, 5);
        assert_eq!(cpu.last_instruction(), Some(Instruction::Hlt));
    }

    #[test]
    fn test_pra_writes_raw_byte() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: reg(0), imm: b'A' },
            Instruction::Pra { reg: reg(0) },
            Instruction::Ldi { reg: reg(0), imm: 0xE9 },
            Instruction::Pra { reg: reg(0) },
            Instruction::Hlt,
        ])).unwrap();

        let mut out: Vec<u8> = Vec::new();
        cpu.run(&mut out).unwrap();

        assert_eq!(out, vec![b'A', b'\n', 0xE9, b'\n']);
    }

    #[test]
    fn test_push_pop() {
        let (cpu, out) = run_program(&[
            Instruction::Ldi { reg: reg(0), imm: 5 },
            Instruction::Push { reg: reg(0) },
            Instruction::Pop { reg: reg(1) },
            Instruction::Prn { reg: reg(1) },
            Instruction::Hlt,
        ]);

        assert_eq!(out, "5\n");
        assert_eq!(cpu.regs.sp(), EMPTY_STACK);
        assert_eq!(cpu.mem.read(EMPTY_STACK - 1), 5);
    }

    #[test]
    fn test_stack_pointer_wraps_silently() {
        let mut cpu = Cpu::new();
        cpu.regs.set_sp(0);

        cpu.push(0xAB).unwrap();
        assert_eq!(cpu.regs.sp(), 0xFF);
        assert_eq!(cpu.mem.read(0xFF), 0xAB);

        assert_eq!(cpu.pop().unwrap(), 0xAB);
        assert_eq!(cpu.regs.sp(), 0);
    }

    #[test]
    fn test_stack_pointer_traps_in_strict_mode() {
        let mut cpu = Cpu::new();
        cpu.overflow = OverflowMode::Trap;
        cpu.regs.set_sp(0);

        assert!(cpu.push(1).is_err());
        assert_eq!(cpu.regs.sp(), 0);
    }

    #[test]
    fn test_cmp_sets_flag() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: reg(0), imm: 10 },
            Instruction::Ldi { reg: reg(1), imm: 10 },
            Instruction::Cmp { a: reg(0), b: reg(1) },
            Instruction::Ldi { reg: reg(1), imm: 11 },
            Instruction::Cmp { a: reg(0), b: reg(1) },
            Instruction::Hlt,
        ])).unwrap();
        let mut out: Vec<u8> = Vec::new();

        cpu.run_limited(&mut out, 3).unwrap();
        assert!(cpu.regs.fl);

        cpu.run(&mut out).unwrap();
        assert!(!cpu.regs.fl);
    }

    #[test]
    fn test_jmp() {
        // 0: LDI R0,7  3: JMP R0  5: PRN R0  7: HLT
        let program = make_program(&[
            Instruction::Ldi { reg: reg(0), imm: 7 },
            Instruction::Jmp { reg: reg(0) },
            Instruction::Prn { reg: reg(0) },
            Instruction::Hlt,
        ]);
        assert_eq!(program.len(), 8);

        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let executed = cpu.run(&mut out).unwrap();

        // LDI, JMP, HLT: the PRN at 5 is jumped over
        assert_eq!(executed, 3);
        assert!(out.is_empty());
    }

    #[test]
    fn test_jeq_not_taken_steps_over_operand() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Jeq { reg: reg(0) },
            Instruction::Hlt,
        ])).unwrap();
        let mut out: Vec<u8> = Vec::new();

        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.regs.pc, 2);
        cpu.step(&mut out).unwrap();
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_jne_taken() {
        let mut cpu = Cpu::new();
        cpu.regs[reg(3)] = 0x80;
        cpu.load_program(&make_program(&[Instruction::Jne { reg: reg(3) }])).unwrap();

        cpu.step(&mut std::io::sink()).unwrap();
        assert_eq!(cpu.regs.pc, 0x80);
    }

    #[test]
    fn test_unknown_opcode_stops_execution() {
        let mut program = make_program(&[Instruction::Ldi { reg: reg(0), imm: 1 }]);
        program.push(0xFF);
        program.extend(make_program(&[Instruction::Prn { reg: reg(0) }, Instruction::Hlt]));

        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();
        let mut out: Vec<u8> = Vec::new();
        let err = cpu.run(&mut out).unwrap_err();

        assert_eq!(err, CpuError::UnknownOpcode { pc: 3, opcode: 0xFF });
        assert_eq!(err.to_string(), "PC 03: unknown instruction ff");
        assert_eq!(cpu.state, CpuState::Error);
        assert_eq!(cpu.cycles, 1);
        assert!(out.is_empty());

        assert_eq!(cpu.step(&mut out), Err(CpuError::NotRunning(CpuState::Error)));
    }

    #[test]
    fn test_invalid_register() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0x47, 9]).unwrap();

        let err = cpu.step(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::InvalidRegister { pc: 0, register: 9 });
    }

    #[test]
    fn test_operand_fetch_wraps_around_memory() {
        let mut cpu = Cpu::new();
        // LDI at 0xFE, its operands at 0xFF and 0x00
        cpu.mem.write(0xFE, 0x82);
        cpu.mem.write(0xFF, 2);
        cpu.mem.write(0x00, 99);
        cpu.regs.pc = 0xFE;

        cpu.step(&mut std::io::sink()).unwrap();

        assert_eq!(cpu.regs[reg(2)], 99);
        assert_eq!(cpu.regs.pc, 0x01);
    }

    #[test]
    fn test_non_halting_program_is_bounded() {
        // 0: LDI R0,0  3: JMP R0
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: reg(0), imm: 0 },
            Instruction::Jmp { reg: reg(0) },
        ])).unwrap();

        let executed = cpu.run_limited(&mut std::io::sink(), 500).unwrap();

        assert_eq!(executed, 500);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_run_limited_budget_saturates() {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: reg(0), imm: 0 },
            Instruction::Jmp { reg: reg(0) },
        ])).unwrap();
        cpu.step(&mut std::io::sink()).unwrap();
        cpu.cycles = u64::MAX - 10;

        let executed = cpu.run_limited(&mut std::io::sink(), u64::MAX).unwrap();

        assert_eq!(executed, 10);
        assert_eq!(cpu.cycles, u64::MAX);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_strict_mode_overflow() {
        let config = MachineConfig { overflow: OverflowMode::Trap, ..MachineConfig::default() };
        let mut cpu = Cpu::with_config(&config);
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: reg(0), imm: 200 },
            Instruction::Add { a: reg(0), b: reg(0) },
            Instruction::Hlt,
        ])).unwrap();

        let err = cpu.run(&mut std::io::sink()).unwrap_err();

        assert!(matches!(err, CpuError::Overflow { pc: 3, .. }));
        assert_eq!(cpu.regs[reg(0)], 200);
        assert_eq!(cpu.state, CpuState::Error);
    }

    #[test]
    fn test_reset() {
        let (mut cpu, _) = run_program(&[
            Instruction::Ldi { reg: reg(0), imm: 1 },
            Instruction::Push { reg: reg(0) },
            Instruction::Hlt,
        ]);

        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.regs.pc, 0);
        assert_eq!(cpu.regs[SP], EMPTY_STACK);
        assert!(!cpu.regs.fl);
        assert!(cpu.mem.as_slice().iter().all(|&b| b == 0));
        assert_eq!(cpu.last_instruction(), None);
    }
}
