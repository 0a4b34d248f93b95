//! `.ls8` program file format.
//!
//! An `.ls8` file is plain text with one byte per line, written as binary
//! digits:
//! - Each line is read like C's `strtol(line, _, 2)`: leading whitespace,
//!   an optional sign, then the longest run of `0`/`1` digits
//! - Anything after the digits (usually a `# comment`) is ignored
//! - Lines with no digits at all, blank or comment-only, are skipped
//! - Values are truncated to 8 bits

use std::path::Path;
use std::io::{BufRead, BufReader, Write};
use thiserror::Error;
use tracing::debug;

/// A loaded `.ls8` program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ls8File {
    /// The program bytes, in load order.
    pub bytes: Vec<u8>,
    /// Per-byte annotation (the source line on load, a comment on save).
    pub source_lines: Vec<String>,
}

impl Ls8File {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte with its annotation.
    pub fn push(&mut self, byte: u8, source: &str) {
        self.bytes.push(byte);
        self.source_lines.push(source.to_string());
    }

    /// Get the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parse the leading base-2 number of a line.
///
/// Returns `None` when no binary digit follows the optional whitespace
/// and sign.
pub fn parse_binary_prefix(line: &str) -> Option<u8> {
    let rest = line.trim_start();
    let (negative, rest) = match rest.as_bytes().first() {
        Some(b'-') => (true, &rest[1..]),
        Some(b'+') => (false, &rest[1..]),
        _ => (false, rest),
    };

    let digits: Vec<u8> = rest
        .bytes()
        .take_while(|b| matches!(b, b'0' | b'1'))
        .map(|b| b - b'0')
        .collect();

    if digits.is_empty() {
        return None;
    }

    // Only the low 8 bits survive the truncation, so accumulate mod 256
    let value = digits.iter().fold(0u8, |acc, &bit| acc.wrapping_shl(1) | bit);
    Some(if negative { value.wrapping_neg() } else { value })
}

/// Parse `.ls8` text.
pub fn parse_ls8(source: &str) -> Ls8File {
    let mut program = Ls8File::new();

    for line in source.lines() {
        if let Some(byte) = parse_binary_prefix(line) {
            program.push(byte, line.trim());
        }
    }

    program
}

/// Load an `.ls8` file from disk.
pub fn load_ls8<P: AsRef<Path>>(path: P) -> Result<Ls8File, LoadError> {
    let path = path.as_ref();
    let io_error = |e: std::io::Error| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let file = std::fs::File::open(path).map_err(io_error)?;
    let reader = BufReader::new(file);

    let mut program = Ls8File::new();
    for line in reader.lines() {
        let line = line.map_err(io_error)?;
        if let Some(byte) = parse_binary_prefix(&line) {
            program.push(byte, line.trim());
        }
    }

    debug!(path = %path.display(), bytes = program.len(), "ls8 file loaded");
    Ok(program)
}

/// Render a program as `.ls8` text.
///
/// Annotations that are non-empty become `# comment` suffixes.
pub fn render_ls8(program: &Ls8File) -> String {
    let mut text = String::from("# LS-8 program\n");
    text.push_str(&format!("# {} bytes\n\n", program.len()));

    for (i, byte) in program.bytes.iter().enumerate() {
        match program.source_lines.get(i).map(|s| s.trim()) {
            Some(comment) if !comment.is_empty() => {
                text.push_str(&format!("{:08b} # {}\n", byte, comment));
            }
            _ => text.push_str(&format!("{:08b}\n", byte)),
        }
    }

    text
}

/// Save a program to disk.
pub fn save_ls8<P: AsRef<Path>>(path: P, program: &Ls8File) -> Result<(), LoadError> {
    let path = path.as_ref();
    let io_error = |e: std::io::Error| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut file = std::fs::File::create(path).map_err(io_error)?;
    file.write_all(render_ls8(program).as_bytes()).map_err(io_error)?;
    Ok(())
}

/// Errors that can occur while reading or writing program files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("cannot access {path}: {message}")]
    Io { path: String, message: String },
}
