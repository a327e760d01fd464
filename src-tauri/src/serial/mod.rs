pub mod emulator;
pub mod interface;
pub mod protocol;

pub use emulator::{DongleEmulator, EmulatorHandle};
pub use interface::{LinkConfig, SerialInterface, SerialLink, SerialPortIO};
pub use protocol::{CodeValue, Command, DongleProtocol, Reply, Slot};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub port_type: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl SerialDeviceInfo {
    /// Bare entry for ports that carry no USB descriptor.
    pub fn named(port_name: impl Into<String>, port_type: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            port_type: port_type.into(),
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("No valid serial port selected")]
    NoPortSelected,

    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Dongle not responding on {port} (reply: {reply:?})")]
    HandshakeFailed { port: String, reply: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Invalid code slot {0}; expected 1 to 3")]
    InvalidSlot(u8),

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
