use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, trace};
use uuid::Uuid;

use super::{Bind, BindMode, Container, ContainerError};

const NSPAWN_FLAGS: [&str; 3] = ["-q", "--as-pid2", "--register=no"];

/// systemd-nspawn backed executor. Commands run under full namespace
/// isolation with the registered binds applied, `-q --as-pid2 --register=no`
/// so nothing is registered with the host's machine manager.
pub struct Nspawn {
    path: PathBuf,
    binds: Vec<Bind>,
}

impl Nspawn {
    pub fn new(path: impl Into<PathBuf>) -> Nspawn {
        let nspawn = Nspawn {
            path: path.into(),
            binds: Vec::new(),
        };
        nspawn.ensure_machine_id();
        nspawn
    }

    /// systemd inside the sandbox misbehaves without a machine id, so write
    /// one the first time we point at a root that lacks it. One-time and
    /// idempotent; an unpopulated root (no etc/ yet) is quietly skipped.
    fn ensure_machine_id(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        let machine_id = self.path.join("etc").join("machine-id");
        if machine_id.exists() {
            return;
        }
        let id = format!("{}\n", Uuid::new_v4().simple());
        match fs::write(&machine_id, id) {
            Ok(()) => debug!("Wrote machine id to {}", machine_id.display()),
            Err(e) => {
                trace!("Could not write {}: {}", machine_id.display(), e)
            }
        }
    }

    fn register_bind(
        &mut self,
        host: &Path,
        sandbox: &Path,
        mode: BindMode,
    ) -> Result<(), ContainerError> {
        if let Some(existing) =
            self.binds.iter_mut().find(|b| b.host == host)
        {
            if existing.mode != mode {
                return Err(ContainerError::BindConflict {
                    host: host.to_path_buf(),
                    mode: existing.mode,
                });
            }
            /* Re-registering the same host path just updates the target */
            existing.sandbox = sandbox.to_path_buf();
            return Ok(());
        }

        self.binds.push(Bind {
            host: host.to_path_buf(),
            sandbox: sandbox.to_path_buf(),
            mode,
        });
        Ok(())
    }

    pub fn bind_args(&self) -> Vec<String> {
        self.binds.iter().map(Bind::to_arg).collect()
    }
}

impl Container for Nspawn {
    fn exec(&self, command: &str) -> Result<(), ContainerError> {
        let mut cmd = Command::new("systemd-nspawn");
        cmd.arg("-D").arg(&self.path);
        cmd.args(NSPAWN_FLAGS);
        cmd.args(self.bind_args());
        cmd.args(["/bin/sh", "-c", command]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        trace!("systemd-nspawn -D {}: {}", self.path.display(), command);
        let status = cmd.status().map_err(|e| ContainerError::Spawn {
            program: "systemd-nspawn".to_string(),
            source: e,
        })?;

        if !status.success() {
            return Err(ContainerError::Exit {
                command: command.to_string(),
                status,
            });
        }
        Ok(())
    }

    fn set_path(&mut self, path: &Path) {
        self.path = path.to_path_buf();
        self.ensure_machine_id();
    }

    fn get_path(&self) -> &Path {
        &self.path
    }

    fn bind(
        &mut self,
        host: &Path,
        sandbox: &Path,
    ) -> Result<(), ContainerError> {
        self.register_bind(host, sandbox, BindMode::ReadWrite)
    }

    fn bind_ro(
        &mut self,
        host: &Path,
        sandbox: &Path,
    ) -> Result<(), ContainerError> {
        self.register_bind(host, sandbox, BindMode::ReadOnly)
    }
}
