use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// The makepkg.conf keys the builder cares about.
const TRACKED_KEYS: [&str; 6] = [
    "SRCDEST",
    "SRCPKGDEST",
    "PKGDEST",
    "LOGDEST",
    "MAKEFLAGS",
    "PACKAGER",
];

/// Immutable view of the makepkg configuration, captured once at startup
/// with the usual precedence: environment beats the user makepkg.conf,
/// which beats the system one. Threaded explicitly through the builder so
/// no call site depends on hidden global state.
#[derive(Debug, Default, Clone)]
pub struct MakepkgConf {
    values: HashMap<String, String>,
}

impl MakepkgConf {
    pub fn load(system_conf: &Path) -> MakepkgConf {
        let mut values = HashMap::new();

        if let Ok(contents) = fs::read_to_string(system_conf) {
            values.extend(MakepkgConf::parse(&contents));
        }
        if let Some(user_conf) = user_conf_path() {
            if let Ok(contents) = fs::read_to_string(&user_conf) {
                values.extend(MakepkgConf::parse(&contents));
            }
        }
        for key in TRACKED_KEYS {
            if let Ok(value) = env::var(key) {
                if !value.is_empty() {
                    values.insert(key.to_string(), value);
                }
            }
        }

        MakepkgConf { values }
    }

    /// Parses `KEY=value` lines, keeping only the tracked keys and stripping
    /// surrounding quotes.
    pub fn parse(input: &str) -> HashMap<String, String> {
        let mut values = HashMap::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => continue,
            };
            if !TRACKED_KEYS.contains(&key) {
                continue;
            }
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| {
                    value
                        .strip_prefix('\'')
                        .and_then(|v| v.strip_suffix('\''))
                })
                .unwrap_or(value);
            values.insert(key.to_string(), value.to_string());
        }

        values
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Artifact destination for `key`, falling back to the process working
    /// directory when unset.
    pub fn dest_or_cwd(&self, key: &str) -> PathBuf {
        match self.get(key) {
            Some(dest) => PathBuf::from(dest),
            None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// `$XDG_CONFIG_HOME/pacman/makepkg.conf`, falling back to `~/.makepkg.conf`.
fn user_conf_path() -> Option<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            let path = PathBuf::from(xdg).join("pacman").join("makepkg.conf");
            if path.exists() {
                return Some(path);
            }
        }
    }
    let home = env::var("HOME").ok().filter(|h| !h.is_empty())?;
    let path = PathBuf::from(home).join(".makepkg.conf");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# /etc/makepkg.conf
CARCH=\"x86_64\"
PKGDEST=/home/user/packages
SRCDEST='/home/user/sources'
MAKEFLAGS=\"-j8\"
PACKAGER=\"A. Packager <packager@example.org>\"
OPTIONS=(strip docs)
";

    #[test]
    fn test_parse_tracked_keys_only() {
        let values = MakepkgConf::parse(SAMPLE);
        assert_eq!(
            values.get("PKGDEST").map(String::as_str),
            Some("/home/user/packages")
        );
        assert_eq!(
            values.get("SRCDEST").map(String::as_str),
            Some("/home/user/sources")
        );
        assert_eq!(values.get("MAKEFLAGS").map(String::as_str), Some("-j8"));
        assert!(!values.contains_key("CARCH"));
        assert!(!values.contains_key("OPTIONS"));
    }

    #[test]
    fn test_dest_or_cwd_fallback() {
        let conf = MakepkgConf {
            values: MakepkgConf::parse(SAMPLE),
        };
        assert_eq!(
            conf.dest_or_cwd("PKGDEST"),
            PathBuf::from("/home/user/packages")
        );

        let cwd = env::current_dir().expect("cwd");
        assert_eq!(conf.dest_or_cwd("LOGDEST"), cwd);
    }
}
