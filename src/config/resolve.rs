use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Local;
use log::trace;

use super::cli::Args;
use super::{Config, PartialConfig};
use crate::bootstrap::default_bootstrap;

const DEFAULT_PATH: &str = "/var/lib/buildpkg";
const DEFAULT_PACMAN_CONF: &str = "/etc/pacman.conf";
const DEFAULT_MAKEPKG_CONF: &str = "/etc/makepkg.conf";

/// Resolves the effective configuration from, in increasing precedence:
/// defaults, `/etc/buildpkg.toml`, the user's `buildpkg.toml`, `BUILDPKG_*`
/// environment variables, and command line flags.
pub fn resolve_config(cli: &Args) -> Result<Config> {
    let mut partial = if cli.no_config {
        PartialConfig::default()
    } else {
        load_partial()?
    };

    apply_env(&mut partial);
    apply_cli(&mut partial, cli);

    let name = match partial.name {
        Some(name) => name,
        None => match env::var("SUDO_USER") {
            Ok(user) if !user.is_empty() => user,
            _ => format!("build-{}", Local::now().format("%Y%m%d-%H%M%S")),
        },
    };

    let backend = partial
        .backend
        .as_deref()
        .unwrap_or("overlay")
        .parse()
        .context("Parsing backend")?;
    let bootstrap = match partial.bootstrap.as_deref() {
        Some(s) => s.parse().context("Parsing bootstrap")?,
        None => default_bootstrap(),
    };

    Ok(Config {
        log_level: partial.log_level.unwrap_or(log::LevelFilter::Info),
        path: PathBuf::from(partial.path.as_deref().unwrap_or(DEFAULT_PATH)),
        name,
        backend,
        bootstrap,
        pacman_conf: PathBuf::from(
            partial.pacman_conf.as_deref().unwrap_or(DEFAULT_PACMAN_CONF),
        ),
        makepkg_conf: PathBuf::from(
            partial
                .makepkg_conf
                .as_deref()
                .unwrap_or(DEFAULT_MAKEPKG_CONF),
        ),
        json: cli.json,
    })
}

/// Loads `/etc/buildpkg.toml`, then the user's config on top of it.
fn load_partial() -> Result<PartialConfig> {
    let mut partial = PartialConfig::default();

    let mut candidates = vec![PathBuf::from("/etc/buildpkg.toml")];
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            candidates.push(PathBuf::from(xdg).join("buildpkg.toml"));
        }
    } else if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            candidates
                .push(PathBuf::from(home).join(".config/buildpkg.toml"));
        }
    }

    for path in candidates {
        if !path.exists() {
            continue;
        }
        trace!("Loading config file {}", path.display());
        let contents = fs::read_to_string(&path)
            .context(format!("Reading {}", path.display()))?;
        let layer: PartialConfig = toml::from_str(&contents)
            .context(format!("Parsing {}", path.display()))?;
        partial.merge(layer);
    }

    Ok(partial)
}

fn apply_env(partial: &mut PartialConfig) {
    if let Ok(level) = env::var("BUILDPKG_LOG_LEVEL") {
        if let Ok(level) = log::LevelFilter::from_str(&level) {
            partial.log_level = Some(level);
        }
    }
    for (var, field) in [
        ("BUILDPKG_PATH", &mut partial.path),
        ("BUILDPKG_NAME", &mut partial.name),
        ("BUILDPKG_BACKEND", &mut partial.backend),
        ("BUILDPKG_BOOTSTRAP", &mut partial.bootstrap),
        ("BUILDPKG_PACMAN_CONF", &mut partial.pacman_conf),
        ("BUILDPKG_MAKEPKG_CONF", &mut partial.makepkg_conf),
    ] {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                *field = Some(value);
            }
        }
    }
}

fn apply_cli(partial: &mut PartialConfig, cli: &Args) {
    if cli.log_level.is_some() {
        partial.log_level = cli.log_level;
    }
    partial.merge(PartialConfig {
        log_level: None,
        path: cli.path.clone(),
        name: cli.name.clone(),
        backend: cli.backend.clone(),
        bootstrap: cli.bootstrap.clone(),
        pacman_conf: cli.pacman_conf.clone(),
        makepkg_conf: cli.makepkg_conf.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(
            std::iter::once("buildpkg").chain(argv.iter().copied()),
        )
    }

    #[test]
    fn test_resolve_defaults() {
        let config =
            resolve_config(&args(&["--no-config", "--name=alice"]))
                .expect("resolve");
        assert_eq!(config.path, PathBuf::from(DEFAULT_PATH));
        assert_eq!(config.pacman_conf, PathBuf::from(DEFAULT_PACMAN_CONF));
        assert_eq!(config.name, "alice");
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert!(!config.json);
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let config = resolve_config(&args(&[
            "--no-config",
            "--name=alice",
            "--path=/srv/containers",
            "--backend=overlay",
            "--bootstrap=archiso",
            "--log-level=debug",
            "--json",
        ]))
        .expect("resolve");
        assert_eq!(config.path, PathBuf::from("/srv/containers"));
        assert_eq!(
            config.bootstrap,
            crate::bootstrap::BootstrapKind::Archiso
        );
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert!(config.json);
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        assert!(
            resolve_config(&args(&[
                "--no-config",
                "--name=alice",
                "--backend=btrfs"
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_fallback_name_has_timestamp_shape() {
        /* When neither --name nor SUDO_USER are available the name is
         * generated; only check the shape so the test doesn't depend on
         * the clock. */
        let config = resolve_config(&args(&["--no-config"])).expect("resolve");
        if env::var("SUDO_USER").is_err() {
            assert!(config.name.starts_with("build-"));
        }
    }
}
