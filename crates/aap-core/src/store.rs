//! In-process settings snapshot backed by a TOML file.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error};

use aap_events::Bus;
use aap_topics::{
    TOPIC_GAME_SETTINGS_UPDATED, TOPIC_GENERAL_SETTINGS_UPDATED, TOPIC_SERVER_ADDRESS_CHANGED,
};

use crate::error::SettingsError;
use crate::form::{general_settings_form, FormDescriptor};
use crate::frontend_log::FrontendLog;
use crate::paths;
use crate::settings::Settings;
use crate::toml_io;

/// Settings paired with the descriptor the UI renders them with.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsForm {
    pub settings: Settings,
    pub constraints: FormDescriptor,
}

pub struct SettingsStore {
    path: PathBuf,
    snapshot: RwLock<Settings>,
    bus: Bus,
    log: FrontendLog,
    windows: bool,
}

impl SettingsStore {
    /// Open the store at the resolved settings path.
    pub fn open(bus: Bus, log: FrontendLog) -> Self {
        Self::at_path(paths::resolve_settings_path(), bus, log)
    }

    pub fn at_path(path: impl Into<PathBuf>, bus: Bus, log: FrontendLog) -> Self {
        let path = path.into();
        let settings = load_or_default(&path, &log);
        log.set_level(settings.logging.level);
        Self {
            path,
            snapshot: RwLock::new(settings),
            bus,
            log,
            windows: cfg!(windows),
        }
    }

    /// Override the platform used for Windows-only setting warnings.
    pub fn with_windows(mut self, windows: bool) -> Self {
        self.windows = windows;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        self.snapshot.read().clone()
    }

    pub fn reload(&self) -> Settings {
        let mut guard = self.snapshot.write();
        let settings = load_or_default(&self.path, &self.log);
        *guard = settings.clone();
        drop(guard);
        self.log.set_level(settings.logging.level);
        settings
    }

    pub fn save(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate().map_err(SettingsError::Invalid)?;
        let mut guard = self.snapshot.write();
        if let Err(err) = toml_io::write_toml(&self.path, &settings) {
            drop(guard);
            self.log.error(err.to_string());
            return Err(err);
        }
        let address_changed = guard.endpoint() != settings.endpoint();
        *guard = settings.clone();
        drop(guard);

        if address_changed {
            self.bus.publish(TOPIC_SERVER_ADDRESS_CHANGED, &settings.endpoint());
        }
        self.log.set_level(settings.logging.level);
        for warning in windows_only_warnings(&settings, self.windows) {
            self.log.warning(warning);
        }
        self.bus.publish(TOPIC_GENERAL_SETTINGS_UPDATED, &settings);
        self.log.info("Saved General Settings");
        Ok(())
    }

    pub fn get_form(&self) -> SettingsForm {
        SettingsForm {
            settings: self.get(),
            constraints: general_settings_form(),
        }
    }

    /// Read a game's config file; a missing file yields an empty table.
    pub fn load_game_settings(&self, rel: &str) -> Result<serde_json::Value, SettingsError> {
        let path = paths::resolve_game_config_path(rel);
        if !path.exists() {
            debug!(path = %path.display(), "game config missing, using empty table");
            return Ok(serde_json::Value::Object(Default::default()));
        }
        let value: toml::Value = toml_io::read_toml(&path)?;
        Ok(serde_json::to_value(value).unwrap_or_default())
    }

    pub fn save_game_settings(
        &self,
        rel: &str,
        value: &serde_json::Value,
    ) -> Result<PathBuf, SettingsError> {
        let path = paths::resolve_game_config_path(rel);
        if let Err(err) = toml_io::write_toml(&path, value) {
            self.log.error(err.to_string());
            return Err(err);
        }
        self.bus.emit(TOPIC_GAME_SETTINGS_UPDATED);
        self.log.info("Saved Game Settings");
        Ok(path)
    }
}

fn load_or_default(path: &Path, log: &FrontendLog) -> Settings {
    if !path.exists() {
        debug!(path = %path.display(), "settings file missing, using defaults");
        return Settings::default();
    }
    match toml_io::read_toml::<Settings>(path) {
        Ok(settings) => match settings.validate() {
            Ok(()) => settings,
            Err(problems) => {
                let err = SettingsError::Invalid(problems);
                error!(path = %path.display(), %err, "settings rejected, using defaults");
                log.error(err.to_string());
                Settings::default()
            }
        },
        Err(err) => {
            error!(%err, "settings unreadable, using defaults");
            log.error(err.to_string());
            Settings::default()
        }
    }
}

/// Warnings for options that only have an effect on Windows.
pub fn windows_only_warnings(settings: &Settings, windows: bool) -> Vec<&'static str> {
    let mut out = Vec::new();
    if windows {
        return out;
    }
    if settings.ui.notifications_enabled {
        out.push("Setting: 'Enable Notifications' only works on Windows");
    }
    if settings.ui.close_should_minimize {
        out.push("Setting: 'Close button should minimize the window' only works on Windows");
    }
    out
}
