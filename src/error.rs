// src/error.rs
//
// Error type shared by the reader, its configuration and the C boundary.

/// Errors surfaced by the serial line reader.
///
/// Overflow of the line buffer is deliberately absent: it is resolved by a
/// forced flush inside the framer and never reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The device could not be opened or configured. Retrying is allowed.
    #[error("Failed to open channel: {0}")]
    ChannelOpen(String),

    /// An I/O error ended the acquisition worker.
    #[error("Channel read failed: {0}")]
    ChannelRead(String),

    /// No line has completed yet.
    #[error("No lines have been received")]
    Empty,

    /// The handle was destroyed.
    #[error("Reader has been destroyed")]
    Disposed,

    /// The operation is not allowed while the worker is running.
    #[error("Reader is busy: {0}")]
    Busy(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ReaderError>;
