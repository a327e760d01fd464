use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::serial::Slot;

/// Dongle connection state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Which screen the front-end should show
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Connect,
    Main,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Modal message box content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, title: title.into(), message: message.into() }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, title: title.into(), message: message.into() }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, title: title.into(), message: message.into() }
    }
}

/// Request for a masked text entry, answered with `set_code`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodePrompt {
    pub slot: Slot,
    pub title: String,
    pub message: String,
}

impl CodePrompt {
    pub fn new_code(slot: Slot) -> Self {
        Self {
            slot,
            title: "Set New Code".to_string(),
            message: format!("Enter new code for slot {}:", slot),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DongleStatus {
    pub state: ConnectionState,
    pub port_name: Option<String>,
    pub status_text: String,
    pub connected_at: Option<DateTime<Utc>>,
}

impl DongleStatus {
    pub fn disconnected(status_text: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            port_name: None,
            status_text: status_text.into(),
            connected_at: None,
        }
    }

    pub fn connecting(port_name: &str) -> Self {
        Self {
            state: ConnectionState::Connecting,
            port_name: Some(port_name.to_string()),
            status_text: format!("Connecting to {}...", port_name),
            connected_at: None,
        }
    }

    pub fn connected(port_name: &str) -> Self {
        Self {
            state: ConnectionState::Connected,
            port_name: Some(port_name.to_string()),
            status_text: format!("Connected to {}", port_name),
            connected_at: Some(Utc::now()),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }
}

impl Default for DongleStatus {
    fn default() -> Self {
        Self::disconnected("Not connected")
    }
}

/// Everything the front-end needs to render after one operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub screen: Screen,
    pub notice: Option<Notice>,
    pub prompt: Option<CodePrompt>,
    pub status: DongleStatus,
}

impl Outcome {
    pub fn new(status: DongleStatus) -> Self {
        let screen = if status.is_connected() { Screen::Main } else { Screen::Connect };
        Self { screen, notice: None, prompt: None, status }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notice = Some(notice);
        self
    }

    pub fn with_prompt(mut self, prompt: CodePrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_follows_connection_state() {
        assert_eq!(Outcome::new(DongleStatus::default()).screen, Screen::Connect);
        assert_eq!(Outcome::new(DongleStatus::connecting("COM3")).screen, Screen::Connect);
        assert_eq!(Outcome::new(DongleStatus::connected("COM3")).screen, Screen::Main);
    }

    #[test]
    fn outcome_serializes_for_the_frontend() {
        let outcome = Outcome::new(DongleStatus::connected("/dev/ttyACM0"))
            .with_prompt(CodePrompt::new_code(Slot::new(2).unwrap()));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["screen"], "main");
        assert_eq!(json["status"]["state"], "connected");
        assert_eq!(json["status"]["statusText"], "Connected to /dev/ttyACM0");
        assert_eq!(json["prompt"]["slot"], 2);
        assert_eq!(json["prompt"]["message"], "Enter new code for slot 2:");
        assert!(json["notice"].is_null());
    }
}
