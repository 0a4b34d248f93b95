//! LS-8 Emulator - CLI Entry Point
//!
//! Commands:
//! - `ls8-emu run <program>` - Run an LS8 or ASM file
//! - `ls8-emu debug <program>` - Interactive debugger
//! - `ls8-emu asm <source>` - Assemble to LS8
//! - `ls8-emu disasm <program>` - Disassemble LS8
//!
//! Exit codes: 0 on success, 2 when the program file cannot be read,
//! 3 on an unknown opcode, 1 for anything else.

use clap::{Parser, Subcommand};
use ls8::{Cpu, CpuError, MachineConfig, OverflowMode};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

const EXIT_FAILURE: i32 = 1;
const EXIT_LOAD: i32 = 2;
const EXIT_UNKNOWN_OPCODE: i32 = 3;

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "An emulator, assembler and debugger for the LS-8 eight-bit computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the LS8 or ASM file to execute
        program: String,
        /// Stop after this many instructions (default: run until HLT)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Log every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Treat arithmetic and stack pointer overflow as errors
        #[arg(short, long)]
        strict: bool,
        /// JSON machine configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Print the final machine state as JSON to stderr
        #[arg(long)]
        dump_state: bool,
    },
    /// Interactive debugger
    Debug {
        /// Path to the LS8 or ASM file to debug
        program: String,
    },
    /// Assemble source to LS8
    Asm {
        /// Path to the source file
        source: String,
        /// Output LS8 file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble LS8 to readable text
    Disasm {
        /// Path to the LS8 file
        program: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { program, max_cycles, trace, strict, config, dump_state }) => {
            let mut config = match config {
                Some(path) => MachineConfig::load(&path).unwrap_or_else(|e| {
                    eprintln!("{}", e);
                    process::exit(EXIT_FAILURE);
                }),
                None => MachineConfig::default(),
            };
            if strict {
                config.overflow = OverflowMode::Trap;
            }
            if max_cycles.is_some() {
                config.max_cycles = max_cycles;
            }
            config.trace |= trace;

            init_logging(config.trace);
            run_program(&program, &config, dump_state);
        }
        Some(Commands::Debug { program }) => {
            debug_program(&program);
        }
        Some(Commands::Asm { source, output }) => {
            init_logging(false);
            assemble_file(&source, output);
        }
        Some(Commands::Disasm { program }) => {
            init_logging(false);
            disassemble_file(&program);
        }
        None => {
            println!("LS-8 Emulator v0.1.0");
            println!("An eight-bit computer emulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the default
/// filter unless tracing was requested explicitly.
fn init_logging(trace: bool) {
    let filter = if trace {
        EnvFilter::new("warn,ls8=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load a program image, assembling `.asm` sources first.
fn load_image(path: &str) -> Vec<u8> {
    use ls8::{assemble, load_ls8};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Cannot open file {}: {}", path, e);
                process::exit(EXIT_LOAD);
            }
        };

        match assemble(&source) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Assembly error: {}", e);
                process::exit(EXIT_FAILURE);
            }
        }
    } else {
        match load_ls8(path) {
            Ok(program) => program.bytes,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(EXIT_LOAD);
            }
        }
    }
}

fn run_program(path: &str, config: &MachineConfig, dump_state: bool) {
    let program = load_image(path);

    let mut cpu = Cpu::with_config(config);
    if let Err(e) = cpu.load_program(&program) {
        eprintln!("Failed to load program: {}", e);
        process::exit(EXIT_FAILURE);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = match config.max_cycles {
        Some(max_cycles) => cpu.run_limited(&mut out, max_cycles),
        None => cpu.run(&mut out),
    };
    drop(out);

    if dump_state {
        match serde_json::to_string_pretty(&cpu) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Cannot serialize machine state: {}", e),
        }
    }

    match result {
        Ok(_) if cpu.is_running() => {
            eprintln!(
                "Reached max cycles limit ({}). Use --max-cycles to increase.",
                cpu.cycles
            );
        }
        Ok(_) => {}
        Err(e @ CpuError::UnknownOpcode { .. }) => {
            eprintln!("{}", e);
            process::exit(EXIT_UNKNOWN_OPCODE);
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(EXIT_FAILURE);
        }
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    use ls8::run_debugger;

    let program = load_image(path);

    if let Err(e) = run_debugger(program) {
        eprintln!("Debugger error: {}", e);
        process::exit(EXIT_FAILURE);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str) {
    eprintln!("This build has no debugger; rebuild with the `tui` feature");
    process::exit(EXIT_FAILURE);
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use ls8::asm::annotate;
    use ls8::{assemble, save_ls8};

    let out_path = output.unwrap_or_else(|| {
        match source_path.strip_suffix(".asm") {
            Some(stem) => format!("{}.ls8", stem),
            None => format!("{}.ls8", source_path),
        }
    });

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Cannot open file {}: {}", source_path, e);
            process::exit(EXIT_LOAD);
        }
    };

    let bytes = match assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Assembly error: {}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    if let Err(e) = save_ls8(&out_path, &annotate(&bytes)) {
        eprintln!("Failed to save program: {}", e);
        process::exit(EXIT_FAILURE);
    }

    println!("Assembled {} bytes to {}", bytes.len(), out_path);
}

fn disassemble_file(path: &str) {
    use ls8::{disassemble, load_ls8};

    let program = match load_ls8(path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(EXIT_LOAD);
        }
    };

    print!("{}", disassemble(&program.bytes));
}
