//! Debugger application state and logic.

use crate::Cpu;
use crate::asm::disasm::{disassemble_at, listing};
use std::collections::HashSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Program image, reloaded on reset.
    pub program: Vec<u8>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u8>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in 16-byte rows.
    pub mem_scroll: usize,
    /// Everything the program printed so far.
    pub output: Vec<u8>,
}

impl DebuggerApp {
    /// Number of 16-byte rows in the memory view.
    pub const MEMORY_ROWS: usize = 16;

    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>) -> Self {
        let mut cpu = Cpu::new();
        let status = match cpu.load_program(&program) {
            Ok(()) => "Ready. Press 's' to step, 'r' to run, 'q' to quit.".to_string(),
            Err(e) => format!("Error: {}", e),
        };

        Self {
            cpu,
            program,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status,
            mem_scroll: 0,
            output: Vec::new(),
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step(&mut self.output) {
            Ok(instr) => {
                self.status = format!("PC={:02x}: {}", pc, instr);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Stopped after {} cycles: {:?}", self.cpu.cycles, self.cpu.state);
            return;
        }

        self.step();

        // Stop before executing the instruction at a breakpoint
        let pc = self.cpu.regs.pc;
        if self.running && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02x}", pc);
        }
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:02x}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:02x}", pc);
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.output.clear();
        self.running = false;
        self.status = match self.cpu.load_program(&self.program) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Error: {}", e),
        };
    }

    /// Scroll the memory view.
    pub fn scroll_memory(&mut self, down: bool) {
        if down {
            self.mem_scroll = (self.mem_scroll + 1).min(Self::MEMORY_ROWS - 1);
        } else {
            self.mem_scroll = self.mem_scroll.saturating_sub(1);
        }
    }

    /// Get disassembly around current PC: (address, text, is_current).
    ///
    /// Uses a sweep of the loaded program when PC sits on one of its
    /// instruction boundaries, otherwise decodes forward from PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u8, String, bool)> {
        let pc = self.cpu.regs.pc;
        let sweep = listing(&self.program);

        if let Some(current) = sweep.iter().position(|line| line.addr == pc as usize) {
            let start = current.saturating_sub(lines / 2);
            return sweep
                .iter()
                .skip(start)
                .take(lines)
                .map(|line| (line.addr as u8, line.text.clone(), line.addr == pc as usize))
                .collect();
        }

        let mut addr = pc;
        (0..lines)
            .map(|_| {
                let (text, size) = disassemble_at(&self.cpu.mem, addr);
                let entry = (addr, text, addr == pc);
                addr = addr.wrapping_add(size);
                entry
            })
            .collect()
    }

    /// Program output as text, with non-UTF-8 bytes replaced.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(false),
                        KeyCode::Down => app.scroll_memory(true),
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // LDI R0,8 / PRN R0 / HLT
    const PRINT8: [u8; 6] = [0x82, 0x00, 0x08, 0x47, 0x00, 0x01];

    #[test]
    fn test_step_collects_output() {
        let mut app = DebuggerApp::new(PRINT8.to_vec());

        app.step();
        assert_eq!(app.status, "PC=00: LDI R0,8");
        app.step();
        assert_eq!(app.output_text(), "8\n");
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = DebuggerApp::new(PRINT8.to_vec());
        app.breakpoints.insert(3);

        app.run();
        for _ in 0..10 {
            app.tick();
        }

        assert!(!app.running);
        assert_eq!(app.cpu.regs.pc, 3);
        assert!(app.output.is_empty());
    }

    #[test]
    fn test_reset_restores_program() {
        let mut app = DebuggerApp::new(PRINT8.to_vec());
        app.run();
        for _ in 0..10 {
            app.tick();
        }
        assert!(app.cpu.is_halted());

        app.reset();

        assert!(app.cpu.is_running());
        assert_eq!(app.cpu.mem.read(0), 0x82);
        assert!(app.output.is_empty());
    }

    #[test]
    fn test_reset_reports_load_failure() {
        let mut app = DebuggerApp::new(vec![0x01; 300]);
        assert!(app.status.starts_with("Error"));

        app.reset();

        assert!(app.status.starts_with("Error"), "status: {}", app.status);
        assert!(app.cpu.mem.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let mut app = DebuggerApp::new(PRINT8.to_vec());
        app.step();

        let lines = app.get_disassembly(3);
        let current: Vec<_> = lines.iter().filter(|(_, _, cur)| *cur).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].0, 3);
        assert_eq!(current[0].1, "PRN R0");
    }
}
