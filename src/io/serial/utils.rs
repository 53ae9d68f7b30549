// src/io/serial/utils.rs
//
// Maps ReaderConfig framing fields onto serialport types.

use serialport::{DataBits, Parity as SpParity, StopBits};

use crate::settings::{Parity, ReaderConfig};

impl From<&Parity> for SpParity {
    fn from(parity: &Parity) -> Self {
        match parity {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }
}

/// Data bits, stop bits and parity for the port.
/// Out-of-range bit counts were already rejected by `ReaderConfig::validate`;
/// anything else falls back to 8-N-1 values.
pub(crate) fn port_framing(config: &ReaderConfig) -> (DataBits, StopBits, SpParity) {
    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };
    let stop_bits = if config.stop_bits == 2 {
        StopBits::Two
    } else {
        StopBits::One
    };
    (data_bits, stop_bits, SpParity::from(&config.parity))
}
