use serde::{Deserialize, Serialize};

use crate::frames::LogLevel;

pub const PORT_MIN: u16 = 1024;
pub const PORT_MAX: u16 = 65535;

pub const DEFAULT_AUTO_PLAYER_HOST: &str = "127.0.0.1";
pub const DEFAULT_AUTO_PLAYER_PORT: u16 = 62121;

pub const THEMES: &[&str] = &[
    "catppuccin",
    "cerberus",
    "crimson",
    "fennec",
    "hamlindigo",
    "legacy",
    "mint",
    "modern",
    "mona",
    "nosh",
    "nouveau",
    "pine",
    "reign",
    "rocket",
    "rose",
    "sahara",
    "seafoam",
    "terminus",
    "vintage",
    "vox",
    "wintry",
];

pub const LOCALES: &[&str] = &["en", "jp", "vn"];

/// General settings persisted to `config.toml`.
///
/// Keys are written in PascalCase; the snake_case aliases keep older files
/// readable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "Device", alias = "device")]
    pub device: DeviceSettings,
    #[serde(rename = "Advanced", alias = "advanced")]
    pub advanced: AdvancedSettings,
    #[serde(rename = "Update", alias = "update")]
    pub update: UpdateSettings,
    #[serde(rename = "Logging", alias = "logging")]
    pub logging: LoggingSettings,
    #[serde(rename = "UI", alias = "ui")]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ResizeDisplay", alias = "wm_size")]
    pub resize_display: bool,
    #[serde(rename = "Streaming", alias = "streaming")]
    pub streaming: bool,
    #[serde(rename = "HardwareDecoding", alias = "hardware_decoding")]
    pub hardware_decoding: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            id: "127.0.0.1:7555".into(),
            resize_display: false,
            streaming: true,
            hardware_decoding: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    #[serde(rename = "ADBHost", alias = "host")]
    pub adb_host: String,
    #[serde(rename = "ADBPort", alias = "port")]
    pub adb_port: u16,
    #[serde(rename = "AutoPlayerHost", alias = "auto_player_host")]
    pub auto_player_host: String,
    #[serde(rename = "AutoPlayerPort", alias = "auto_player_port")]
    pub auto_player_port: u16,
    #[serde(rename = "StreamingFPS", alias = "streaming_fps")]
    pub streaming_fps: u32,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            adb_host: "127.0.0.1".into(),
            adb_port: 5037,
            auto_player_host: DEFAULT_AUTO_PLAYER_HOST.into(),
            auto_player_port: DEFAULT_AUTO_PLAYER_PORT,
            streaming_fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    #[serde(rename = "AutoUpdate", alias = "auto_updates")]
    pub auto_update: bool,
    #[serde(rename = "EnableAlphaUpdates", alias = "enable_alpha_updates")]
    pub enable_alpha_updates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    #[serde(rename = "Level", alias = "level")]
    pub level: LogLevel,
    #[serde(rename = "DebugScreenshotLimit", alias = "debug_save_screenshots")]
    pub debug_screenshot_limit: u32,
    #[serde(rename = "TaskLogLimit", alias = "action_log_limit")]
    pub task_log_limit: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            debug_screenshot_limit: 60,
            task_log_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    #[serde(rename = "Theme", alias = "theme")]
    pub theme: String,
    #[serde(rename = "Locale", alias = "locale")]
    pub locale: String,
    #[serde(rename = "CloseShouldMinimize", alias = "close_should_minimize")]
    pub close_should_minimize: bool,
    #[serde(rename = "NotificationsEnabled", alias = "notifications_enabled")]
    pub notifications_enabled: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: "catppuccin".into(),
            locale: "en".into(),
            close_should_minimize: false,
            notifications_enabled: false,
        }
    }
}

/// Host/port pair the worker server listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}/{}", self.authority(), path.trim_start_matches('/'))
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}/{}", self.authority(), path.trim_start_matches('/'))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.authority())
    }
}

impl Settings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.advanced.auto_player_host.clone(),
            self.advanced.auto_player_port,
        )
    }

    /// Check the invariants a saved file must satisfy.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        for (name, port) in [
            ("Advanced.ADBPort", self.advanced.adb_port),
            ("Advanced.AutoPlayerPort", self.advanced.auto_player_port),
        ] {
            if !(PORT_MIN..=PORT_MAX).contains(&port) {
                problems.push(format!(
                    "{name} must be between {PORT_MIN} and {PORT_MAX}, got {port}"
                ));
            }
        }
        if !LogLevel::SELECTABLE.contains(&self.logging.level) {
            problems.push(format!(
                "Logging.Level must be one of DEBUG, INFO, WARNING, ERROR, FATAL, got {}",
                self.logging.level
            ));
        }
        if !THEMES.contains(&self.ui.theme.as_str()) {
            problems.push(format!("UI.Theme `{}` is not a known theme", self.ui.theme));
        }
        if !LOCALES.contains(&self.ui.locale.as_str()) {
            problems.push(format!("UI.Locale `{}` is not supported", self.ui.locale));
        }
        if self.advanced.auto_player_host.trim().is_empty() {
            problems.push("Advanced.AutoPlayerHost must not be empty".into());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.endpoint(), Endpoint::new("127.0.0.1", 62121));
        assert_eq!(settings.logging.task_log_limit, 5);
    }

    #[test]
    fn validate_reports_every_violation() {
        let mut settings = Settings::default();
        settings.advanced.auto_player_port = 80;
        settings.logging.level = LogLevel::Trace;
        settings.ui.theme = "neon".into();
        let problems = settings.validate().unwrap_err();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("AutoPlayerPort"));
    }

    #[test]
    fn endpoint_urls() {
        let ep = Endpoint::new("127.0.0.1", 62121);
        assert_eq!(ep.http_url("/health"), "http://127.0.0.1:62121/health");
        assert_eq!(ep.ws_url("ws"), "ws://127.0.0.1:62121/ws");
    }
}
