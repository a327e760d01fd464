#![allow(dead_code)]

use std::sync::Arc;
use dongle_lock_lib::config::AppSettings;
use dongle_lock_lib::device::{DongleManager, MemoryClipboard, Outcome};
use dongle_lock_lib::serial::{DongleEmulator, EmulatorHandle};

pub const PORT: &str = "emu0";

pub fn manager() -> (DongleManager, Arc<MemoryClipboard>) {
    let clipboard = Arc::new(MemoryClipboard::new());
    let settings = AppSettings { boot_settle_ms: 0, ..AppSettings::default() };
    (DongleManager::new(settings, clipboard.clone()), clipboard)
}

/// Manager already connected to a fresh emulated dongle
pub async fn connected() -> (DongleManager, Arc<MemoryClipboard>, EmulatorHandle) {
    let (manager, clipboard) = manager();
    let (dongle, handle) = DongleEmulator::new();
    let outcome: Outcome = manager.connect_with_io(PORT, Box::new(dongle)).await.expect("connect");
    assert!(outcome.status.is_connected(), "handshake failed: {:?}", outcome.notice);
    (manager, clipboard, handle)
}
