use std::fs;
use std::io::Write;
use std::path::Path;

use log::debug;

use super::{BuildError, Builder};
use crate::container::Container;
use crate::pacman::PacmanConf;
use crate::util::{copy_dir, copy_file, create_file, rooted};

/// Initial files written into a freshly provisioned root.
const INIT_FILES: [(&str, &str); 3] = [
    (".buildpkg", "v1"),
    ("/etc/locale.conf", "LANG=en_US.UTF-8"),
    ("/etc/locale.gen", "en_US.UTF-8 UTF-8"),
];

impl Builder {
    /// Synchronizes all host configuration the container needs: the pacman
    /// keyring, the mirrorlist, and the pacman/makepkg configuration files.
    pub(super) fn setup_config(&mut self) -> Result<(), BuildError> {
        self.setup_gnupg()?;
        self.set_mirror_list()?;
        self.setup_pacman()
    }

    /// Replaces the container's pacman keyring with the host's.
    pub(super) fn setup_gnupg(&mut self) -> Result<(), BuildError> {
        let sync = |source| BuildError::ConfigSync {
            what: "pacman keyring",
            source,
        };

        let container_gnupg =
            rooted(&self.container_path, Path::new("/etc/pacman.d/gnupg"));
        if container_gnupg.exists() {
            fs::remove_dir_all(&container_gnupg).map_err(sync)?;
        }
        copy_dir(&self.gnupg_dir, &container_gnupg).map_err(sync)?;
        Ok(())
    }

    /// Writes the container's mirrorlist from the host pacman.conf. Only
    /// the [core] servers are carried over so we don't contaminate the
    /// container with mirrors we don't want.
    fn set_mirror_list(&mut self) -> Result<(), BuildError> {
        let sync = |source| BuildError::ConfigSync {
            what: "mirrorlist",
            source,
        };

        let conf = PacmanConf::load(&self.pacman_conf).map_err(sync)?;
        let mirrorlist =
            rooted(&self.container_path, Path::new("/etc/pacman.d/mirrorlist"));
        if let Some(parent) = mirrorlist.parent() {
            fs::create_dir_all(parent).map_err(sync)?;
        }

        let mut file = fs::File::create(&mirrorlist).map_err(sync)?;
        for server in conf.core_servers() {
            writeln!(file, "Server = {}", server).map_err(sync)?;
        }
        debug!("Wrote mirrorlist to {}", mirrorlist.display());
        Ok(())
    }

    /// Copies pacman.conf (plus any files it Includes) and makepkg.conf
    /// into the container at their host paths.
    fn setup_pacman(&mut self) -> Result<(), BuildError> {
        let sync = |source| BuildError::ConfigSync {
            what: "pacman configuration",
            source,
        };

        copy_file(
            &self.pacman_conf,
            &rooted(&self.container_path, &self.pacman_conf),
        )
        .map_err(sync)?;

        let conf = PacmanConf::load(&self.pacman_conf).map_err(sync)?;
        for include in &conf.includes {
            if include.exists() {
                copy_file(include, &rooted(&self.container_path, include))
                    .map_err(sync)?;
            }
        }

        copy_file(
            &self.makepkg_conf,
            &rooted(&self.container_path, &self.makepkg_conf),
        )
        .map_err(sync)?;
        Ok(())
    }

    /// Writes the version tag and locale configuration of a fresh root.
    pub(super) fn create_initial_files(&mut self) -> Result<(), BuildError> {
        for (filename, contents) in INIT_FILES {
            create_file(
                &self.container_path,
                filename,
                contents.as_bytes(),
                0o644,
            )
            .map_err(|source| BuildError::ConfigSync {
                what: "initial files",
                source,
            })?;
        }
        Ok(())
    }

    /// Registers pacman's cache directories as binds for the next exec. The
    /// first cache directory is the one pacman writes to; everything else is
    /// exposed read-only.
    pub(super) fn setup_cache_dirs(&mut self) -> Result<(), BuildError> {
        let conf = PacmanConf::load(&self.pacman_conf).map_err(|source| {
            BuildError::ConfigSync {
                what: "cache directories",
                source,
            }
        })?;

        let mut cache_dirs = conf.cache_dirs.iter();
        if let Some(first) = cache_dirs.next() {
            self.container.bind(first, first)?;
        }
        for cache_dir in cache_dirs {
            self.container.bind_ro(cache_dir, cache_dir)?;
        }
        Ok(())
    }
}
