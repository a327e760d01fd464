pub mod clipboard;
pub mod manager;
pub mod models;

pub use clipboard::{Clipboard, MemoryClipboard};
pub use manager::DongleManager;
pub use models::*;


#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Dongle not connected")]
    NotConnected,

    #[error("Dongle already connected")]
    AlreadyConnected,

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
