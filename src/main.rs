#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::use_debug
)]

mod backend;
mod bootstrap;
mod builder;
mod config;
mod container;
mod logger;
mod makepkg;
mod pacman;
mod util;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{debug, info};
use nix::unistd::geteuid;

use backend::BackendKind;
use bootstrap::{Bootstrap, BootstrapKind};
use builder::{Builder, Products};
use config::cli::{Action, Args};
use config::{Config, resolve_config};
use container::Nspawn;
use makepkg::MakepkgConf;
use pacman::PacmanConf;
use util::Lock;

pub fn main() -> Result<()> {
    let logger = logger::BuildLogger::new(log::LevelFilter::Info)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli = Args::parse();

    let config = resolve_config(&cli).context("Resolving config")?;
    logger.set_level(config.log_level);

    /* Mounting, unmounting, and nspawn all need elevated rights for the
     * whole lifecycle */
    if !geteuid().is_root() {
        return Err(anyhow!(
            "Insufficient permissions to manage containers, please retry using `sudo`"
        ));
    }

    match cli.action.unwrap_or(Action::Build) {
        Action::Build => run_build(&config),
        Action::Create { dir } => run_create(&config, Path::new(&dir)),
        Action::Destroy { dir } => run_destroy(Path::new(&dir)),
    }
}

fn new_builder(config: &Config, dir: &Path) -> Result<Builder> {
    let pacmanconf = PacmanConf::load(&config.pacman_conf).context(format!(
        "Reading pacman configuration from {}",
        config.pacman_conf.display()
    ))?;

    let bootstrap: Box<dyn Bootstrap> = match config.bootstrap {
        BootstrapKind::Pacstrap => {
            Box::new(bootstrap::Pacstrap::new(&config.pacman_conf))
        }
        BootstrapKind::Archiso => {
            let mirror = pacmanconf.core_mirror().context(
                "No [core] mirror in pacman.conf to download the bootstrap from",
            )?;
            Box::new(bootstrap::Archiso::new(&mirror))
        }
    };

    Ok(Builder::new(
        dir,
        config.backend.open(dir),
        bootstrap,
        Box::new(Nspawn::new("")),
        &config.pacman_conf,
        &config.makepkg_conf,
        MakepkgConf::load(&config.makepkg_conf),
    ))
}

/// The full pipeline: Init -> Update -> Fork -> Build -> Destroy, with the
/// snapshot destroyed even when the build fails so no mount is ever leaked.
fn run_build(config: &Config) -> Result<()> {
    let _lock = Lock::container(&config.path)
        .context("Locking container directory")?;
    let mut builder = new_builder(config, &config.path)?;

    builder.init().context("Initializing container")?;
    builder.update().context("Updating container")?;

    info!("Synchronizing chroot copy [root] -> [{}]", config.name);
    let products = builder
        .with_snapshot(&config.name, Builder::build)
        .context("Build failed")?;

    report_products(config, &products)
}

fn run_create(config: &Config, dir: &Path) -> Result<()> {
    let _lock =
        Lock::container(dir).context("Locking container directory")?;
    let mut builder = new_builder(config, dir)?;
    builder.init().context("Initializing container")?;
    info!("Created container at {}", dir.display());
    Ok(())
}

fn run_destroy(dir: &Path) -> Result<()> {
    let _lock =
        Lock::container(dir).context("Locking container directory")?;
    let kind = BackendKind::from_container(dir)?;
    debug!("Rediscovered {} backend at {}", kind, dir.display());

    let mut backend = kind.open(dir);
    backend.destroy().context("Destroying container")?;
    info!("Destroyed container at {}", dir.display());
    Ok(())
}

#[allow(clippy::print_stdout)]
fn report_products(config: &Config, products: &Products) -> Result<()> {
    if config.json {
        println!(
            "{}",
            serde_json::to_string_pretty(products)
                .context("Serializing products")?
        );
        return Ok(());
    }

    for (category, files) in products {
        for dest in files.values() {
            info!("{}: {}", category, dest.display());
        }
    }
    Ok(())
}
