use std::sync::Arc;
use tauri::State;

use crate::device::{DongleManager, DongleStatus, Outcome};
use crate::serial::SerialDeviceInfo;

/// List serial ports the dongle could be on
#[tauri::command]
pub async fn list_ports(
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Vec<SerialDeviceInfo>, String> {
    manager
        .list_ports()
        .map_err(|e| format!("Failed to list serial ports: {}", e))
}

/// Re-enumerate ports; the front-end warns when the list is empty
#[tauri::command]
pub async fn refresh_ports(
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Vec<SerialDeviceInfo>, String> {
    let ports = manager
        .list_ports()
        .map_err(|e| format!("Failed to refresh serial ports: {}", e))?;
    if ports.is_empty() {
        log::warn!("No serial ports detected");
    }
    Ok(ports)
}

/// Current connection status
#[tauri::command]
pub async fn get_status(
    manager: State<'_, Arc<DongleManager>>,
) -> Result<DongleStatus, String> {
    Ok(manager.status().await)
}

/// Open a port and handshake with the dongle
#[tauri::command]
pub async fn connect_dongle(
    port_name: String,
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Outcome, String> {
    manager
        .connect(&port_name)
        .await
        .map_err(|e| format!("Failed to connect to dongle: {}", e))
}

/// Say goodbye, close the port and clear the clipboard
#[tauri::command]
pub async fn disconnect_dongle(
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Outcome, String> {
    Ok(manager.disconnect().await)
}

/// Copy the code in `slot` to the clipboard
#[tauri::command]
pub async fn get_code(
    slot: u8,
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Outcome, String> {
    manager
        .get_code(slot)
        .await
        .map_err(|e| format!("Failed to get code: {}", e))
}

/// Store a new code in an empty slot
#[tauri::command]
pub async fn set_code(
    slot: u8,
    value: String,
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Outcome, String> {
    manager
        .set_code(slot, value)
        .await
        .map_err(|e| format!("Failed to set code: {}", e))
}

/// Erase every stored code
#[tauri::command]
pub async fn clear_all(
    manager: State<'_, Arc<DongleManager>>,
) -> Result<Outcome, String> {
    manager
        .clear_all()
        .await
        .map_err(|e| format!("Failed to clear codes: {}", e))
}
