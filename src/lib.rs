// src/lib.rs
//
// Serial line reader: reads a byte stream from a serial port on a worker
// thread, splits it into lines on a configurable terminator and exposes the
// accumulated lines to Rust and C callers.

#[macro_use]
mod logging;

pub mod error;
#[cfg(not(target_os = "ios"))]
pub mod ffi;
pub mod handle;
pub mod io;
pub mod line_store;
pub mod settings;
pub mod snapshot;

pub use error::{ReaderError, Result};
pub use handle::{delay, ReaderHandle, ReaderState};
pub use io::{LineEnd, StatsSnapshot, StreamEnd, Terminator, WorkerStatus};
pub use line_store::LineRecord;
pub use logging::{init_file_logging, set_stderr_logging, stop_file_logging};
pub use settings::{Parity, ReaderConfig};
pub use snapshot::{LineArray, Snapshot};

#[cfg(not(target_os = "ios"))]
pub use io::serial::{list_serial_ports, SerialPortInfo};
