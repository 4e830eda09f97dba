use serde::Deserialize;
use std::path::PathBuf;

use crate::backend::BackendKind;
use crate::bootstrap::BootstrapKind;

use super::impls::deserialize_level_filter;

/// One layer of configuration as read from a file; every field optional so
/// layers can be merged front to back.
#[derive(Deserialize, Default, Clone)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub path: Option<String>,
    pub name: Option<String>,
    pub backend: Option<String>,
    pub bootstrap: Option<String>,
    pub pacman_conf: Option<String>,
    pub makepkg_conf: Option<String>,
}

impl PartialConfig {
    /// Overlays `other` on top of this layer; set fields win.
    pub fn merge(&mut self, other: PartialConfig) {
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.path.is_some() {
            self.path = other.path;
        }
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.bootstrap.is_some() {
            self.bootstrap = other.bootstrap;
        }
        if other.pacman_conf.is_some() {
            self.pacman_conf = other.pacman_conf;
        }
        if other.makepkg_conf.is_some() {
            self.makepkg_conf = other.makepkg_conf;
        }
    }
}

/// Fully resolved configuration, immutable once constructed and threaded
/// through the builder explicitly.
#[derive(Clone)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub path: PathBuf,
    pub name: String,
    pub backend: BackendKind,
    pub bootstrap: BootstrapKind,
    pub pacman_conf: PathBuf,
    pub makepkg_conf: PathBuf,
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_from_toml() {
        let partial: PartialConfig = toml::from_str(
            "log_level = \"debug\"\n\
             path = \"/srv/buildpkg\"\n\
             backend = \"overlay\"\n",
        )
        .expect("toml");
        assert_eq!(partial.log_level, Some(log::LevelFilter::Debug));
        assert_eq!(partial.path.as_deref(), Some("/srv/buildpkg"));
        assert_eq!(partial.backend.as_deref(), Some("overlay"));
        assert!(partial.name.is_none());
    }

    #[test]
    fn test_partial_config_rejects_bad_level() {
        let result: Result<PartialConfig, _> =
            toml::from_str("log_level = \"noisy\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut base = PartialConfig {
            path: Some("/var/lib/buildpkg".to_string()),
            name: Some("root-layer".to_string()),
            ..Default::default()
        };
        base.merge(PartialConfig {
            name: Some("user-layer".to_string()),
            ..Default::default()
        });
        assert_eq!(base.path.as_deref(), Some("/var/lib/buildpkg"));
        assert_eq!(base.name.as_deref(), Some("user-layer"));
    }
}
