mod nspawn;

pub use nspawn::Nspawn;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command exited with {status}: {command}")]
    Exit { command: String, status: ExitStatus },

    #[error("{host} is already registered as a {mode} bind")]
    BindConflict { host: PathBuf, mode: BindMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindMode::ReadWrite => write!(f, "read-write"),
            BindMode::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// One bind mount to apply on the next exec. Binds are kept as an ordered
/// list so the arguments we hand to the container runtime are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host: PathBuf,
    pub sandbox: PathBuf,
    pub mode: BindMode,
}

impl Bind {
    /// Renders as a systemd-nspawn `--bind`/`--bind-ro` argument, using the
    /// short form when host and sandbox paths coincide.
    pub fn to_arg(&self) -> String {
        let flag = match self.mode {
            BindMode::ReadWrite => "--bind",
            BindMode::ReadOnly => "--bind-ro",
        };
        if self.host == self.sandbox {
            format!("{}={}", flag, self.host.display())
        } else {
            format!(
                "{}={}:{}",
                flag,
                self.host.display(),
                self.sandbox.display()
            )
        }
    }
}

/// Runs commands to completion inside an isolated namespace view rooted at a
/// directory it is told to use. No knowledge of the snapshot topology.
pub trait Container {
    /// Runs `command` through a shell inside the sandbox with all registered
    /// binds applied, streaming stdio through. Blocks until the child exits;
    /// callers needing bounded execution time must enforce it externally.
    fn exec(&self, command: &str) -> Result<(), ContainerError>;

    /// Points the sandbox at a new root directory.
    fn set_path(&mut self, path: &Path);

    fn get_path(&self) -> &Path;

    /// Registers a read-write bind for the next exec.
    fn bind(&mut self, host: &Path, sandbox: &Path)
    -> Result<(), ContainerError>;

    /// Registers a read-only bind for the next exec. A host path may not be
    /// registered both read-write and read-only.
    fn bind_ro(
        &mut self,
        host: &Path,
        sandbox: &Path,
    ) -> Result<(), ContainerError>;
}
