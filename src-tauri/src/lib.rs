pub mod config;
pub mod device;
pub mod serial;

#[cfg(feature = "gui")]
pub mod commands;

#[cfg(feature = "gui")]
pub use desktop::run;

#[cfg(feature = "gui")]
mod desktop {
  use std::sync::Arc;
  use tauri::Manager;

  use crate::commands;
  use crate::config::{AppSettings, SETTINGS_FILE};
  use crate::device::clipboard::TauriClipboard;
  use crate::device::DongleManager;

  fn load_settings(app: &tauri::App) -> AppSettings {
    let path = match app.path().app_config_dir() {
      Ok(dir) => dir.join(SETTINGS_FILE),
      Err(e) => {
        log::warn!("No app config directory ({}), using default settings", e);
        return AppSettings::default();
      }
    };

    AppSettings::load(&path).unwrap_or_else(|e| {
      log::error!("{:#}; using default settings", e);
      AppSettings::default()
    })
  }

  #[cfg_attr(mobile, tauri::mobile_entry_point)]
  pub fn run() {
    tauri::Builder::default()
      .plugin(tauri_plugin_clipboard_manager::init())
      .invoke_handler(tauri::generate_handler![
        commands::list_ports,
        commands::refresh_ports,
        commands::get_status,
        commands::connect_dongle,
        commands::disconnect_dongle,
        commands::get_code,
        commands::set_code,
        commands::clear_all,
      ])
      .setup(|app| {
        app.handle().plugin(
          tauri_plugin_log::Builder::default()
            .level(log::LevelFilter::Trace)
            .build(),
        )?;

        let settings = load_settings(app);
        log::set_max_level(settings.log_level_filter());

        // The manager needs the app handle for clipboard access, so it is built here
        let clipboard = Arc::new(TauriClipboard::new(app.handle().clone()));
        app.manage(Arc::new(DongleManager::new(settings, clipboard)));

        log::info!("Dongle Lock application started");
        Ok(())
      })
      .run(tauri::generate_context!())
      .expect("error while running tauri application");
  }
}
