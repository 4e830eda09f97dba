mod overlay;

pub use overlay::Overlay;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Marker file written at the top level of the base root. Its contents name
/// the backend variant that owns the container, so an independent process
/// (e.g. `buildpkg destroy`) can rediscover the backend from a bare path.
pub const MARKER_FILE: &str = ".buildpkg-fs";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to set up backend root at {path}")]
    SetupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to mount overlay at {target}")]
    MountFailed {
        target: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to unmount {target}")]
    UnmountFailed {
        target: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to clean up {path}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid snapshot name '{name}'")]
    InvalidSnapshotName { name: String },

    #[error("{path} is not a container")]
    NotAContainer { path: PathBuf },
}

/// The on-disk topology of one build root: the base tree plus zero or more
/// named copy-on-write branches layered over it. Pure filesystem and mount
/// logic; no process execution.
pub trait Backend {
    /// Materializes the base root and writes the identity marker. Idempotent;
    /// safe to call when the root already exists.
    fn setup(&mut self) -> Result<PathBuf, BackendError>;

    /// Creates a named writable branch over the base root and returns the
    /// merged view processes should operate on. Not transactional: if the
    /// mount is rejected after the directories were created, the directories
    /// are left behind for `remove_snapshot` or `destroy` to clean up.
    fn add_snapshot(&mut self, name: &str) -> Result<PathBuf, BackendError>;

    /// Unmounts the merged view for `name`, then deletes the snapshot's
    /// directories, never the base root. An already-unmounted target is
    /// tolerated with a warning; a busy mount aborts the cleanup so we never
    /// delete under an active mount.
    fn remove_snapshot(&mut self, name: &str) -> Result<(), BackendError>;

    /// Unconditional teardown of everything this backend ever created for
    /// the container, including the base root itself.
    fn destroy(&mut self) -> Result<(), BackendError>;

    /// The path callers should currently treat as the active filesystem
    /// root: the base root until a snapshot exists, the most recently
    /// created snapshot's merged view afterward.
    fn get_path(&self) -> &Path;
}

/// Closed set of backend variants, resolved from a configuration string once
/// rather than string-matched at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Overlay,
}

impl BackendKind {
    /// Constructs the backend for a container directory.
    pub fn open(self, dir: &Path) -> Box<dyn Backend> {
        match self {
            BackendKind::Overlay => Box::new(Overlay::new(dir)),
        }
    }

    /// Rediscovers the backend variant owning `dir` from its marker file.
    pub fn from_container(dir: &Path) -> Result<BackendKind, BackendError> {
        let marker = dir.join("root").join(MARKER_FILE);
        let token = fs::read_to_string(&marker).map_err(|_| {
            BackendError::NotAContainer {
                path: dir.to_path_buf(),
            }
        })?;
        token
            .trim()
            .parse()
            .map_err(|_| BackendError::NotAContainer {
                path: dir.to_path_buf(),
            })
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overlay" => Ok(BackendKind::Overlay),
            _ => Err(anyhow::anyhow!(
                "Unknown backend: '{}'. Valid backends are: overlay",
                s
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Overlay => write!(f, "overlay"),
        }
    }
}

/// True when `dir` holds an already-provisioned container.
pub fn container_exists(dir: &Path) -> bool {
    dir.join("root").join(MARKER_FILE).exists()
}
