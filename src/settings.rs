// src/settings.rs
//
// Reader configuration: port parameters, line buffer size and terminator.
// Loadable from TOML; every field except `port` has a default.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ReaderError, Result};
use crate::io::framer::{Terminator, DEFAULT_BUFFER_CAPACITY};

/// Parity setting for serial port configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    /// Device identifier, e.g. "/dev/ttyUSB0" or "COM3"
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub terminator: Terminator,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    /// Per-read timeout; bounds how long a stop request can go unnoticed
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout_ms() -> u64 {
    50
}

impl ReaderConfig {
    /// Configuration with the given port parameters and defaults elsewhere.
    /// A zero `buffer_capacity` selects the default.
    pub fn new(port: impl Into<String>, baud_rate: u32, buffer_capacity: usize) -> Self {
        ReaderConfig {
            port: port.into(),
            baud_rate,
            buffer_capacity: if buffer_capacity == 0 {
                DEFAULT_BUFFER_CAPACITY
            } else {
                buffer_capacity
            },
            terminator: Terminator::default(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::None,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ReaderError::InvalidConfig("Port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ReaderError::InvalidConfig("Baud rate must be non-zero".to_string()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ReaderError::InvalidConfig(format!(
                "Unsupported data bits: {}",
                self.data_bits
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ReaderError::InvalidConfig(format!(
                "Unsupported stop bits: {}",
                self.stop_bits
            )));
        }
        if self.buffer_capacity == 0 || self.buffer_capacity < self.terminator.len() {
            return Err(ReaderError::InvalidConfig(format!(
                "Buffer capacity {} is smaller than the {}-byte terminator",
                self.buffer_capacity,
                self.terminator.len()
            )));
        }
        Ok(())
    }

    /// Short form for log lines, e.g. "/dev/ttyUSB0 @ 9600 (8-N-1)"
    pub fn describe(&self) -> String {
        format!(
            "{} @ {} ({}-{}-{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            self.stop_bits
        )
    }
}
