use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::serial::interface::{BAUD_RATE, BOOT_SETTLE, READ_TIMEOUT};
use crate::serial::LinkConfig;

pub const SETTINGS_FILE: &str = "settings.json";

/// Application settings, persisted as JSON in the app config directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub boot_settle_ms: u64,
    pub clear_clipboard_on_disconnect: bool,
    pub log_level: String,
    /// Offer an emulated dongle in the port list
    pub simulator: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u64,
            boot_settle_ms: BOOT_SETTLE.as_millis() as u64,
            clear_clipboard_on_disconnect: true,
            log_level: "info".to_string(),
            simulator: false,
        }
    }
}

impl AppSettings {
    /// Load settings, falling back to defaults when the file does not exist yet
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Malformed settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            boot_settle: self.boot_settle(),
        }
    }

    pub fn boot_settle(&self) -> Duration {
        Duration::from_millis(self.boot_settle_ms)
    }

    /// Unknown level names fall back to `Info`
    pub fn log_level_filter(&self) -> log::LevelFilter {
        log::LevelFilter::from_str(&self.log_level).unwrap_or(log::LevelFilter::Info)
    }
}
