//! Machine configuration.
//!
//! A [`MachineConfig`] can be read from a JSON file and then overridden
//! field by field from the command line:
//!
//! ```json
//! { "overflow": "trap", "max_cycles": 100000 }
//! ```

use crate::cpu::OverflowMode;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Settings applied to a [`Cpu`](crate::Cpu) and its run loop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Arithmetic overflow policy.
    pub overflow: OverflowMode,
    /// Stop after this many instructions. `None` runs until HLT.
    pub max_cycles: Option<u64>,
    /// Trace every executed instruction.
    pub trace: bool,
}

impl MachineConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config: {0}")]
    Parse(String),
}
