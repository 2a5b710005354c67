//! Candidate-list path resolution shared by the settings store, the worker
//! locator and game config lookup.

use std::path::{Path, PathBuf};

/// Env var overriding the directory holding per-game config files.
pub const CONFIG_DIR_ENV: &str = "ADB_AUTO_PLAYER_CONFIG_DIR";

pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Return the first candidate that exists on disk.
pub fn first_existing<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .find(|p| p.exists())
}

/// Like [`first_existing`], but fall back to the first candidate so callers
/// always get a path to write to.
pub fn first_existing_or_first(candidates: &[PathBuf]) -> Option<PathBuf> {
    first_existing(candidates).or_else(|| candidates.first().cloned())
}

/// Expand a leading `~` or `~/` to the home directory. `~user` is returned
/// unchanged.
pub fn expand_user(path: &str) -> PathBuf {
    expand_user_with(path, home_dir().as_deref())
}

fn expand_user_with(path: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(path);
    };
    if path == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Candidate locations for the general settings file, most specific first.
pub fn settings_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(target_os = "linux") {
        if let Some(home) = home_dir() {
            candidates.push(home.join(".config/adb_auto_player/config.toml"));
        }
    }
    candidates.push(PathBuf::from("config.toml"));
    candidates.push(PathBuf::from("config/config.toml"));
    // macOS dev builds run from inside the .app bundle
    candidates.push(PathBuf::from("../../config/config.toml"));
    candidates
}

/// Resolve where settings are read from and written to.
pub fn resolve_settings_path() -> PathBuf {
    let candidates = settings_candidates();
    first_existing_or_first(&candidates).unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Resolve a game config file (`rel` is relative to a game config root).
///
/// Search order (first existing wins, else the first candidate):
/// - `ADB_AUTO_PLAYER_CONFIG_DIR` (with `~` expansion) joined with `rel`
/// - `games/` under the working directory
/// - the dev worker tree `python/adb_auto_player/games`
pub fn resolve_game_config_path(rel: &str) -> PathBuf {
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return rel_path.to_path_buf();
    }
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            candidates.push(expand_user(dir.trim()).join(rel_path));
        }
    }
    candidates.push(Path::new("games").join(rel_path));
    candidates.push(Path::new("python/adb_auto_player/games").join(rel_path));
    candidates.push(Path::new("../../python/adb_auto_player/games").join(rel_path));
    first_existing_or_first(&candidates).unwrap_or_else(|| rel_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_existing_picks_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.toml");
        let b = dir.path().join("b.toml");
        let c = dir.path().join("c.toml");
        std::fs::write(&b, "").unwrap();
        std::fs::write(&c, "").unwrap();
        assert_eq!(first_existing([&a, &b, &c]), Some(b.clone()));
        assert_eq!(first_existing([&a]), None);
        assert_eq!(first_existing_or_first(&[a.clone()]), Some(a));
        assert_eq!(first_existing_or_first(&[]), None);
    }

    #[test]
    fn expand_user_handles_tilde_forms() {
        let home = Path::new("/home/alex");
        assert_eq!(expand_user_with("~", Some(home)), PathBuf::from("/home/alex"));
        assert_eq!(
            expand_user_with("~/games/x.toml", Some(home)),
            PathBuf::from("/home/alex/games/x.toml")
        );
        assert_eq!(expand_user_with("~bob/x", Some(home)), PathBuf::from("~bob/x"));
        assert_eq!(expand_user_with("/abs", Some(home)), PathBuf::from("/abs"));
        assert_eq!(expand_user_with("~/x", None), PathBuf::from("~/x"));
        assert_eq!(expand_user_with("", Some(home)), PathBuf::from(""));
    }

    #[test]
    fn settings_candidates_end_with_repo_relative_paths() {
        let candidates = settings_candidates();
        assert!(candidates.contains(&PathBuf::from("config.toml")));
        assert_eq!(
            candidates.last(),
            Some(&PathBuf::from("../../config/config.toml"))
        );
    }

    #[test]
    #[serial_test::serial]
    fn game_config_dir_env_wins_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("afk")).unwrap();
        std::fs::write(dir.path().join("afk/config.toml"), "").unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        let resolved = resolve_game_config_path("afk/config.toml");
        std::env::remove_var(CONFIG_DIR_ENV);
        assert_eq!(resolved, dir.path().join("afk/config.toml"));
    }

    #[test]
    #[serial_test::serial]
    fn game_config_falls_back_to_first_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_DIR_ENV, dir.path());
        let resolved = resolve_game_config_path("missing/config.toml");
        std::env::remove_var(CONFIG_DIR_ENV);
        assert_eq!(resolved, dir.path().join("missing/config.toml"));
    }
}
