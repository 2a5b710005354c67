//! TOML file helpers shared by general and game settings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::error::SettingsError;

static INTEGER_FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)=(\s\d+)\.0(\s|$)").expect("static regex"));

/// Strip the `.0` serializers put on integral floats (`= 60.0` -> `= 60`).
pub fn strip_integer_floats(text: &str) -> String {
    INTEGER_FLOAT.replace_all(text, "=${1}${2}").into_owned()
}

pub fn to_toml_string<T: Serialize>(value: &T) -> Result<String, SettingsError> {
    let text = toml::to_string(value)?;
    Ok(strip_integer_floats(&text))
}

pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `value` and replace `path`, creating parent directories.
///
/// The text is written to a sibling temp file first and renamed over the
/// target.
pub fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), SettingsError> {
    let text = to_toml_string(value)?;
    let write_err = |source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, text.as_bytes()).map_err(write_err)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(err));
    }
    Ok(())
}
