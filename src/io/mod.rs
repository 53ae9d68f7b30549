// src/io/mod.rs
//
// Byte channel abstraction and the acquisition pipeline built on it.
// The serial driver is one implementation; tests use scripted channels.

pub mod acquisition;
pub mod channel;
pub mod framer;
#[cfg(not(target_os = "ios"))]
pub mod serial;
#[cfg(test)]
pub(crate) mod testing;

pub use acquisition::{AcquisitionStats, StatsSnapshot, StreamEnd, WorkerStatus};
pub use channel::StreamChannel;
pub use framer::{FramedLine, LineEnd, LineFramer, Terminator};

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::settings::ReaderConfig;

/// Result of a single-byte read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One byte arrived
    Byte(u8),
    /// Nothing available yet (timeout / would-block). Not a failure.
    Idle,
    /// The far end closed the stream
    Closed,
}

/// An opened, configured, readable byte source
pub trait ByteChannel: Send {
    /// Blocking read of the next byte. An `Err` ends acquisition.
    fn read_byte(&mut self) -> std::io::Result<ReadOutcome>;
}

/// Opens a configured byte channel for a reader
pub trait ChannelOpener: Send + Sync {
    fn open(&self, config: &ReaderConfig) -> Result<Box<dyn ByteChannel>>;
}

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
