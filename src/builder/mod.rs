mod artifacts;
mod configs;
mod setup;
mod sources;

pub use artifacts::Products;

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use log::{debug, info, warn};
use thiserror::Error;

use crate::backend::{Backend, BackendError, container_exists};
use crate::bootstrap::{Bootstrap, ProvisionError};
use crate::container::{Container, ContainerError};
use crate::makepkg::MakepkgConf;

const MAKEPKG_ARGS: &str = "--syncdeps --noconfirm --log --holdver --skipinteg";
const MAKEPKG_COMMAND: &str = "sudo --preserve-env=SOURCE_DATE_EPOCH -iu builduser bash -c 'cd /startdir; makepkg \"$@\"' -bash ";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("failed to provision the base root")]
    Provision(#[source] ProvisionError),

    #[error("failed to synchronize {what} into the container")]
    ConfigSync {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch build sources")]
    Sources(#[source] io::Error),

    #[error("source fetch exited with {status}")]
    SourcesExit { status: ExitStatus },

    #[error("failed to move {category} artifacts to {dest}")]
    ArtifactMove {
        category: &'static str,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Orchestrates the container lifecycle: a base root is provisioned once,
/// then each build forks a named copy-on-write snapshot, runs makepkg inside
/// it, and tears the snapshot down, always returning to the base root.
///
/// State machine: Uninitialized -> RootReady (init) -> SnapshotActive (fork)
/// -> RootReady (destroy). Exactly one builder may operate on a container
/// directory at a time; callers hold the advisory `Lock` for the whole
/// pipeline.
pub struct Builder {
    backend: Box<dyn Backend>,
    bootstrap: Box<dyn Bootstrap>,
    container: Box<dyn Container>,
    /// Container directory holding the base root and all snapshots.
    path: PathBuf,
    /// The active filesystem root: `<path>/root`, or the merged view of the
    /// active snapshot between fork and destroy.
    container_path: PathBuf,
    pacman_conf: PathBuf,
    makepkg_conf: PathBuf,
    makepkg: MakepkgConf,
    /// Host keyring directory synchronized into the container.
    pub(crate) gnupg_dir: PathBuf,
}

impl Builder {
    pub fn new(
        path: impl Into<PathBuf>,
        backend: Box<dyn Backend>,
        bootstrap: Box<dyn Bootstrap>,
        container: Box<dyn Container>,
        pacman_conf: impl Into<PathBuf>,
        makepkg_conf: impl Into<PathBuf>,
        makepkg: MakepkgConf,
    ) -> Builder {
        let path = path.into();
        let container_path = path.join("root");
        Builder {
            backend,
            bootstrap,
            container,
            path,
            container_path,
            pacman_conf: pacman_conf.into(),
            makepkg_conf: makepkg_conf.into(),
            makepkg,
            gnupg_dir: PathBuf::from("/etc/pacman.d/gnupg"),
        }
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    fn point_at(&mut self, path: PathBuf) {
        self.container_path = path;
        self.container.set_path(&self.container_path);
    }

    /// Initializes the base root. When the marker file is already present
    /// the root is treated as provisioned and only the executor is pointed
    /// at it; a half-provisioned root from an earlier failed init is simply
    /// provisioned again.
    pub fn init(&mut self) -> Result<(), BuildError> {
        if container_exists(&self.path) {
            debug!(
                "Container at {} already provisioned",
                self.path.display()
            );
            let root = self.path.join("root");
            self.point_at(root);
            return Ok(());
        }

        let root = self.backend.setup()?;

        /* Populate before pointing the executor at the root: the machine-id
         * fix-up in set_path needs the payload's etc/ to exist. */
        self.bootstrap
            .populate(&root)
            .map_err(BuildError::Provision)?;
        self.point_at(root);
        self.setup_config()?;
        self.create_initial_files()?;
        self.container.exec("locale-gen")?;
        self.setup_cache_dirs()?;
        self.container.exec("pacman -Syu --noconfirm base-devel")?;
        Ok(())
    }

    /// Re-synchronizes configuration into the base root in case anything
    /// changed on the host. Does not touch any snapshot.
    pub fn update(&mut self) -> Result<(), BuildError> {
        self.setup_config()
    }

    /// Forks a named snapshot of the base root and points the executor at
    /// it. The root's package set is upgraded first so every snapshot starts
    /// from a current base. If a step after the snapshot mount fails, the
    /// snapshot is left mounted; callers must still invoke `destroy` to
    /// avoid leaking the mount.
    pub fn fork(&mut self, name: &str) -> Result<(), BuildError> {
        self.setup_cache_dirs()?;
        self.container.exec("pacman -Syu --noconfirm")?;

        let merged = self.backend.add_snapshot(name)?;
        self.point_at(merged);

        self.setup_snapshot()?;
        Ok(())
    }

    /// Runs the package build inside the active snapshot and moves the
    /// produced artifacts to their host destinations.
    pub fn build(&mut self) -> Result<Products, BuildError> {
        self.download_sources()?;

        let srcdest = match self.makepkg.get("SRCDEST") {
            Some(dir) => PathBuf::from(dir),
            None => self.container_path.join("srcdest"),
        };
        self.container.bind(&srcdest, Path::new("/srcdest"))?;

        let startdir = env::current_dir().map_err(BuildError::Sources)?;
        self.container.bind(&startdir, Path::new("/startdir"))?;

        self.container
            .exec(&format!("{}{}", MAKEPKG_COMMAND, MAKEPKG_ARGS))?;

        self.move_products()
    }

    /// Removes a snapshot and points the executor back at the base root.
    /// Safe to call after a partially failed fork; the backend tolerates a
    /// snapshot whose mount is already gone.
    pub fn destroy(&mut self, name: &str) -> Result<(), BuildError> {
        self.backend.remove_snapshot(name)?;
        let root = self.path.join("root");
        self.point_at(root);
        Ok(())
    }

    /// Runs `f` inside a freshly forked snapshot, destroying the snapshot
    /// afterward no matter how `f` fares so no mount is ever leaked. When
    /// both `f` and the cleanup fail, `f`'s error is the one reported and
    /// the cleanup failure is logged.
    pub fn with_snapshot<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Builder) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        if let Err(e) = self.fork(name) {
            if let Err(cleanup) = self.destroy(name) {
                warn!(
                    "Could not clean up snapshot [{}]: {}",
                    name, cleanup
                );
            }
            return Err(e);
        }

        let result = f(self);

        info!("Deleting chroot copy [{}]", name);
        match (result, self.destroy(name)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(
                    "Could not clean up snapshot [{}]: {}",
                    name, cleanup
                );
                Err(e)
            }
        }
    }
}
