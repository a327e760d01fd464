use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::AppSettings;
use crate::serial::emulator::SIMULATED_PORT;
use crate::serial::{
    CodeValue, DongleEmulator, DongleProtocol, Reply, SerialDeviceInfo, SerialError,
    SerialInterface, SerialPortIO, Slot,
};
use super::{Clipboard, CodePrompt, DeviceError, DongleStatus, Notice, Outcome, Result};

/// Placeholder the port picker shows when enumeration comes back empty
pub const NO_PORTS_PLACEHOLDER: &str = "No Ports Found";

const HIDDEN_NOTE: &str = "(Password hidden for security)";

/// Drives the dongle on behalf of the UI.
///
/// Owns the single connection. Requests take the session lock for the whole
/// write/read exchange, so at most one command is ever outstanding. Serial
/// I/O blocks, so it runs on tokio's blocking pool.
pub struct DongleManager {
    session: Arc<Mutex<Option<DongleProtocol>>>,
    status: Arc<RwLock<DongleStatus>>,
    clipboard: Arc<dyn Clipboard>,
    settings: AppSettings,
}

impl DongleManager {
    pub fn new(settings: AppSettings, clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            status: Arc::new(RwLock::new(DongleStatus::default())),
            clipboard,
            settings,
        }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Enumerate serial ports, plus the emulated dongle when enabled
    pub fn list_ports(&self) -> Result<Vec<SerialDeviceInfo>> {
        let mut ports = SerialInterface::discover_ports()?;
        if self.settings.simulator {
            ports.push(SerialDeviceInfo::named(SIMULATED_PORT, "Simulator"));
        }
        log::debug!("Found {} serial port(s)", ports.len());
        Ok(ports)
    }

    pub async fn status(&self) -> DongleStatus {
        self.status.read().await.clone()
    }

    /// Open `port_name` and perform the CONNECT handshake
    pub async fn connect(&self, port_name: &str) -> Result<Outcome> {
        let port_name = port_name.trim().to_string();
        if port_name.is_empty() || port_name.contains(NO_PORTS_PLACEHOLDER) {
            return Ok(self.connect_failed(&port_name, SerialError::NoPortSelected).await);
        }

        if self.settings.simulator && port_name == SIMULATED_PORT {
            let (emulator, _) = DongleEmulator::new();
            return self.connect_with_io(&port_name, Box::new(emulator)).await;
        }

        let link = self.settings.link_config();
        let target = port_name.clone();
        self.establish(&port_name, move || DongleProtocol::connect(&target, &link))
            .await
    }

    /// Handshake over a transport the caller already opened
    pub async fn connect_with_io(&self, port_name: &str, io: Box<dyn SerialPortIO>) -> Result<Outcome> {
        let settle = self.settings.boot_settle();
        let target = port_name.to_string();
        self.establish(port_name, move || DongleProtocol::connect_with(&target, io, settle))
            .await
    }

    async fn establish<F>(&self, port_name: &str, open: F) -> Result<Outcome>
    where
        F: FnOnce() -> crate::serial::Result<DongleProtocol> + Send + 'static,
    {
        let mut session = self.session.clone().lock_owned().await;
        if session.is_some() {
            return Err(DeviceError::AlreadyConnected);
        }

        self.set_status(DongleStatus::connecting(port_name)).await;
        log::info!("Attempting to connect to port: {}", port_name);

        let opened = tokio::task::spawn_blocking(open)
            .await
            .map_err(|e| DeviceError::TaskFailed(e.to_string()))?;

        match opened {
            Ok(protocol) => {
                *session = Some(protocol);
                drop(session);
                self.set_status(DongleStatus::connected(port_name)).await;
                log::info!("Successfully connected to dongle on {}", port_name);
                Ok(Outcome::new(self.status().await))
            }
            Err(e) => {
                drop(session);
                Ok(self.connect_failed(port_name, e).await)
            }
        }
    }

    async fn connect_failed(&self, port_name: &str, error: SerialError) -> Outcome {
        log::error!("Connection to {:?} failed: {}", port_name, error);
        self.set_status(DongleStatus::default()).await;

        let notice = match &error {
            SerialError::NoPortSelected => {
                Notice::error("Connection Error", "No valid serial port selected.")
            }
            SerialError::HandshakeFailed { port, .. } => {
                Notice::error("Device Not Found", format!("Dongle not responding on {}", port))
            }
            other => Notice::error("Connection Error", other.to_string()),
        };
        Outcome::new(self.status().await).with_notice(notice)
    }

    /// Close the session and return to the connect screen. Never fails.
    pub async fn disconnect(&self) -> Outcome {
        let protocol = self.session.lock().await.take();

        if let Some(protocol) = protocol {
            let port = protocol.port_name().to_string();
            if let Err(e) = tokio::task::spawn_blocking(move || protocol.disconnect()).await {
                log::warn!("Disconnect task for {} failed: {}", port, e);
            }
            log::info!("Disconnected from dongle on {}", port);
        }

        if self.settings.clear_clipboard_on_disconnect {
            if let Err(e) = self.clipboard.clear() {
                log::warn!("Failed to clear clipboard: {}", e);
            }
        }

        self.set_status(DongleStatus::disconnected("Disconnected")).await;
        Outcome::new(self.status().await)
    }

    /// Fetch a code into the clipboard, or prompt for one if the slot is empty
    pub async fn get_code(&self, slot: u8) -> Result<Outcome> {
        let slot = Slot::new(slot)?;
        let reply = self.with_protocol(move |protocol| protocol.get_code(slot)).await?;

        if reply.is_disconnect() {
            return Ok(self.drop_connection("Dongle disconnected. Please reconnect the device.").await);
        }

        let outcome = Outcome::new(self.status().await);
        Ok(match reply {
            Reply::Code(code) => self.copy_secret(
                outcome,
                &code,
                Notice::info("Code Copied", format!("Code {} copied to clipboard\n{}", slot, HIDDEN_NOTE)),
            ),
            Reply::NoCode => outcome.with_prompt(CodePrompt::new_code(slot)),
            other => {
                log::warn!("Unexpected reply to GET_CODE_{}: {}", slot, other);
                outcome.with_notice(Notice::warning("Unexpected", format!("Unexpected reply: {}", other)))
            }
        })
    }

    /// Store a new code in an empty slot. An empty value means the prompt was cancelled.
    pub async fn set_code(&self, slot: u8, value: String) -> Result<Outcome> {
        let slot = Slot::new(slot)?;
        if value.is_empty() {
            return Ok(Outcome::new(self.status().await));
        }

        let code = match CodeValue::new(value) {
            Ok(code) => code,
            Err(e) => {
                return Ok(Outcome::new(self.status().await)
                    .with_notice(Notice::warning("Invalid Code", e.to_string())));
            }
        };

        let sent = code.clone();
        let reply = self.with_protocol(move |protocol| protocol.set_code(slot, &sent)).await?;

        if reply.is_disconnect() {
            return Ok(self.drop_connection("Dongle disconnected during save. Please reconnect.").await);
        }

        let outcome = Outcome::new(self.status().await);
        Ok(match reply {
            Reply::Saved => self.copy_secret(
                outcome,
                &code,
                Notice::info("Code Saved", format!("Code {} saved and copied to clipboard\n{}", slot, HIDDEN_NOTE)),
            ),
            other => {
                log::warn!("Unexpected reply to SET_CODE_{}: {}", slot, other);
                outcome.with_notice(Notice::error("Error", "Failed to save code."))
            }
        })
    }

    /// Wipe every slot. The UI asks for confirmation before calling this.
    pub async fn clear_all(&self) -> Result<Outcome> {
        let reply = self.with_protocol(|protocol| protocol.clear_all()).await?;

        if reply.is_disconnect() {
            return Ok(self.drop_connection("Dongle disconnected. Please reconnect the device.").await);
        }

        let outcome = Outcome::new(self.status().await);
        Ok(match reply {
            Reply::Cleared => outcome.with_notice(Notice::info("Cleared", "All codes cleared.")),
            other => outcome.with_notice(Notice::error("Error", format!("Unexpected reply: {}", other))),
        })
    }

    /// Run one blocking exchange on the connected dongle
    async fn with_protocol<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut DongleProtocol) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut session = self.session.clone().lock_owned().await;
        if session.is_none() {
            return Err(DeviceError::NotConnected);
        }

        tokio::task::spawn_blocking(move || match &mut *session {
            Some(protocol) => Ok(f(protocol)),
            None => Err(DeviceError::NotConnected),
        })
        .await
        .map_err(|e| DeviceError::TaskFailed(e.to_string()))?
    }

    async fn drop_connection(&self, message: &str) -> Outcome {
        log::warn!("{}", message);
        self.disconnect()
            .await
            .with_notice(Notice::error("Device Disconnected", message))
    }

    fn copy_secret(&self, outcome: Outcome, code: &CodeValue, notice: Notice) -> Outcome {
        match self.clipboard.copy(code.expose()) {
            Ok(()) => outcome.with_notice(notice),
            Err(e) => {
                log::error!("Failed to copy code to clipboard: {}", e);
                outcome.with_notice(Notice::error("Clipboard Error", e.to_string()))
            }
        }
    }

    async fn set_status(&self, status: DongleStatus) {
        *self.status.write().await = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryClipboard, NoticeLevel, Screen};

    fn manager() -> (DongleManager, Arc<MemoryClipboard>) {
        let clipboard = Arc::new(MemoryClipboard::new());
        let settings = AppSettings { boot_settle_ms: 0, ..AppSettings::default() };
        (DongleManager::new(settings, clipboard.clone()), clipboard)
    }

    #[tokio::test]
    async fn placeholder_port_is_rejected() {
        let (manager, _) = manager();
        for port in ["", "  ", NO_PORTS_PLACEHOLDER] {
            let outcome = manager.connect(port).await.unwrap();
            assert_eq!(outcome.screen, Screen::Connect);
            let notice = outcome.notice.unwrap();
            assert_eq!(notice.level, NoticeLevel::Error);
            assert_eq!(notice.message, "No valid serial port selected.");
        }
    }

    #[tokio::test]
    async fn operations_need_a_connection() {
        let (manager, _) = manager();
        assert!(matches!(manager.get_code(1).await, Err(DeviceError::NotConnected)));
        assert!(matches!(manager.clear_all().await, Err(DeviceError::NotConnected)));
        assert!(matches!(
            manager.set_code(1, "abc".to_string()).await,
            Err(DeviceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn simulator_port_connects_when_enabled() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let settings = AppSettings { boot_settle_ms: 0, simulator: true, ..AppSettings::default() };
        let manager = DongleManager::new(settings, clipboard);

        let outcome = manager.connect(SIMULATED_PORT).await.unwrap();
        assert_eq!(outcome.screen, Screen::Main);
        assert_eq!(outcome.status.status_text, format!("Connected to {}", SIMULATED_PORT));

        let outcome = manager.get_code(1).await.unwrap();
        assert!(outcome.prompt.is_some());
    }

    #[tokio::test]
    async fn disconnect_without_session_still_resets() {
        let (manager, clipboard) = manager();
        clipboard.copy("leftover").unwrap();
        let outcome = manager.disconnect().await;
        assert_eq!(outcome.screen, Screen::Connect);
        assert_eq!(outcome.status.status_text, "Disconnected");
        assert_eq!(clipboard.contents(), "");
    }
}
