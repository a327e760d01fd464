pub mod settings;

pub use settings::{AppSettings, SETTINGS_FILE};
