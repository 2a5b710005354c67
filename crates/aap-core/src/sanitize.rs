//! Hide the local account name in user-visible log text.

use regex::Regex;

/// Rewrites home-directory prefixes of one user to shell-style placeholders.
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    rules: Vec<(Regex, String)>,
}

impl PathSanitizer {
    /// Sanitizer for the account running this process. Without a known user
    /// name it passes messages through untouched.
    pub fn current() -> Self {
        let username = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_default();
        Self::for_user(cfg!(windows), &username)
    }

    pub fn for_user(windows: bool, username: &str) -> Self {
        // DOMAIN\user
        let username = username
            .rsplit_once('\\')
            .map(|(_, name)| name)
            .unwrap_or(username)
            .trim();
        if username.is_empty() {
            return Self { rules: Vec::new() };
        }
        let name = regex::escape(username);
        let specs: Vec<(String, String)> = if windows {
            vec![(
                format!(r"([A-Za-z]):\\Users\\{name}"),
                r"${1}:\Users\$$env:USERNAME".to_string(),
            )]
        } else {
            vec![
                (format!("/home/{name}"), "/home/$$USER".to_string()),
                (format!("/Users/{name}"), "/Users/$$USER".to_string()),
            ]
        };
        let rules = specs
            .into_iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(&pattern).ok().map(|re| (re, replacement))
            })
            .collect();
        Self { rules }
    }

    pub fn sanitize(&self, message: &str) -> String {
        if self.rules.is_empty() || message.contains("{redacted}") {
            return message.to_string();
        }
        let mut out = message.to_string();
        for (re, replacement) in &self.rules {
            out = re.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_paths_on_any_drive() {
        let s = PathSanitizer::for_user(true, "testuser");
        assert_eq!(
            s.sanitize(r"adb_path: C:\Users\testuser\AppData\file.txt and D:\Users\testuser\Desktop"),
            r"adb_path: C:\Users\$env:USERNAME\AppData\file.txt and D:\Users\$env:USERNAME\Desktop"
        );
    }

    #[test]
    fn unix_home_prefixes() {
        let s = PathSanitizer::for_user(false, "test.user");
        assert_eq!(
            s.sanitize("/Users/test.user/.config/x and /home/test.user/y"),
            "/Users/$USER/.config/x and /home/$USER/y"
        );
        // regex metacharacters in the name are literal
        assert_eq!(s.sanitize("/home/testXuser/y"), "/home/testXuser/y");
    }

    #[test]
    fn domain_prefix_is_dropped() {
        let s = PathSanitizer::for_user(true, r"CORP\alex");
        assert_eq!(s.sanitize(r"C:\Users\alex\x"), r"C:\Users\$env:USERNAME\x");
    }

    #[test]
    fn redacted_and_unknown_user_pass_through() {
        let s = PathSanitizer::for_user(false, "alex");
        assert_eq!(s.sanitize("{redacted} /home/alex"), "{redacted} /home/alex");
        let none = PathSanitizer::for_user(false, "");
        assert_eq!(none.sanitize("/home/alex"), "/home/alex");
    }
}
