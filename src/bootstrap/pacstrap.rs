use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

use super::{Bootstrap, ProvisionError};

/// Populates the root by running the host's pacstrap against it.
/// `-G` skips copying the host keyring (we sync our own), `-M` skips the
/// host mirrorlist, `-c` uses the host package cache, `-d` allows a
/// non-mountpoint target.
pub struct Pacstrap {
    pacman_conf: PathBuf,
    packages: Vec<String>,
}

impl Pacstrap {
    pub fn new(pacman_conf: impl Into<PathBuf>) -> Pacstrap {
        Pacstrap {
            pacman_conf: pacman_conf.into(),
            packages: vec!["base-devel".to_string()],
        }
    }
}

impl Bootstrap for Pacstrap {
    fn populate(&self, root: &Path) -> Result<(), ProvisionError> {
        let mut cmd = Command::new("pacstrap");
        cmd.arg("-GMcd");
        cmd.arg("-C").arg(&self.pacman_conf);
        cmd.arg(root);
        cmd.args(&self.packages);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("pacstrap -GMcd {}", root.display());
        let status = cmd.status().map_err(|e| ProvisionError::Spawn {
            program: "pacstrap".to_string(),
            source: e,
        })?;

        if !status.success() {
            return Err(ProvisionError::Exit {
                program: "pacstrap".to_string(),
                status,
            });
        }
        Ok(())
    }
}
