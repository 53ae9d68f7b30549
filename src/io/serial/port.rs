// src/io/serial/port.rs
//
// Opens serial ports through the serialport crate.

use std::time::Duration;

use serialport::SerialPortType;

use super::utils::port_framing;
use crate::error::{ReaderError, Result};
use crate::io::{ByteChannel, ChannelOpener, StreamChannel};
use crate::settings::ReaderConfig;

/// One entry of `list_serial_ports`
#[derive(Clone, Debug)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// Opens the device named in the reader config (8-N-1 unless configured)
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl ChannelOpener for SerialPortOpener {
    fn open(&self, config: &ReaderConfig) -> Result<Box<dyn ByteChannel>> {
        let (data_bits, stop_bits, parity) = port_framing(config);
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| ReaderError::ChannelOpen(format!("Failed to open {}: {}", config.port, e)))?;

        tlog!("[serial] Opened {}", config.describe());

        Ok(Box::new(StreamChannel::new(port)))
    }
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut entry = SerialPortInfo {
            port_name: info.port_name,
            port_type: String::new(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        };
        entry.port_type = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                entry.manufacturer = usb.manufacturer;
                entry.product = usb.product;
                entry.serial_number = usb.serial_number;
                entry.vid = Some(usb.vid);
                entry.pid = Some(usb.pid);
                "USB"
            }
            SerialPortType::BluetoothPort => "Bluetooth",
            SerialPortType::PciPort => "PCI",
            SerialPortType::Unknown => "Unknown",
        }
        .to_string();
        entry
    }
}

/// macOS lists every device twice; only the `/dev/cu.*` side opens without
/// waiting for carrier detect.
#[cfg(target_os = "macos")]
fn is_listed(port_name: &str) -> bool {
    !port_name.starts_with("/dev/tty.")
}

#[cfg(not(target_os = "macos"))]
fn is_listed(_port_name: &str) -> bool {
    true
}

/// Serial devices a reader can be pointed at
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| ReaderError::ChannelOpen(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|p| is_listed(&p.port_name))
        .map(SerialPortInfo::from)
        .collect())
}
