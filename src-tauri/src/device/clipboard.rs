use std::sync::{Mutex, PoisonError};

use super::Result;

/// System clipboard seam. Codes only ever leave the app through here.
pub trait Clipboard: Send + Sync {
    fn copy(&self, text: &str) -> Result<()>;

    fn clear(&self) -> Result<()> {
        self.copy("")
    }
}

/// Process-local clipboard, used headless and in tests
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn copy(&self, text: &str) -> Result<()> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = text.to_string();
        Ok(())
    }
}

#[cfg(feature = "gui")]
pub use desktop::TauriClipboard;

#[cfg(feature = "gui")]
mod desktop {
    use tauri::{AppHandle, Runtime};
    use tauri_plugin_clipboard_manager::ClipboardExt;

    use super::Clipboard;
    use crate::device::{DeviceError, Result};

    /// System clipboard through the Tauri clipboard-manager plugin
    pub struct TauriClipboard<R: Runtime> {
        app: AppHandle<R>,
    }

    impl<R: Runtime> TauriClipboard<R> {
        pub fn new(app: AppHandle<R>) -> Self {
            Self { app }
        }
    }

    impl<R: Runtime> Clipboard for TauriClipboard<R> {
        fn copy(&self, text: &str) -> Result<()> {
            self.app
                .clipboard()
                .write_text(text.to_string())
                .map_err(|e| DeviceError::Clipboard(e.to_string()))
        }
    }
}
