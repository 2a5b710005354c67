//! Shared model and persistence for the ADB Auto Player supervisor:
//! wire frames, general settings and their form descriptor, the settings
//! store, path resolution and the frontend log sink.

pub mod error;
pub mod form;
pub mod frames;
pub mod frontend_log;
pub mod paths;
pub mod sanitize;
pub mod settings;
pub mod store;
pub mod toml_io;
pub mod util;

pub use error::SettingsError;
pub use form::{general_settings_form, Constraint, FormDescriptor};
pub use frames::{InboundFrame, LogFrame, LogLevel, SummaryFrame};
pub use frontend_log::FrontendLog;
pub use sanitize::PathSanitizer;
pub use settings::{Endpoint, Settings};
pub use store::{SettingsForm, SettingsStore};
