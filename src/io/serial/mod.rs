// src/io/serial/mod.rs
//
// Serial port driver: opens a configured port as a ByteChannel and lists
// the ports available on this host.

pub mod port;
pub(crate) mod utils;

pub use port::{list_serial_ports, SerialPortInfo, SerialPortOpener};
