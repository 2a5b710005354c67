//! Environment switches.

/// Set to a truthy value when running from a development checkout.
pub const DEV_ENV: &str = "AAP_DEV";

const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];
const FALSY: [&str; 4] = ["0", "false", "no", "off"];

/// `1/0`, `true/false`, `yes/no`, `on/off` in any case; anything else is `None`.
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    let value = raw.trim();
    if TRUTHY.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSY.iter().any(|f| value.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().as_deref().and_then(parse_bool_flag)
}

pub fn is_dev() -> bool {
    env_bool(DEV_ENV).unwrap_or(false)
}
