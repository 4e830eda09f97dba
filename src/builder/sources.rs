use std::env;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use super::{BuildError, Builder};
use crate::util::rooted;

impl Builder {
    /// Fetches and verifies the package sources as the invoking user, not
    /// root, so the source cache stays owned by them. Runs the container's
    /// makepkg.conf against the host checkout before anything enters the
    /// sandbox.
    pub(super) fn download_sources(&mut self) -> Result<(), BuildError> {
        let builddir = tempfile::Builder::new()
            .prefix("srcdir")
            .tempdir_in("/var/tmp")
            .map_err(BuildError::Sources)?;

        let makepkg_conf =
            rooted(&self.container_path, Path::new("/etc/makepkg.conf"));
        let srcdest = match self.makepkg.get("SRCDEST") {
            Some(dir) => dir.to_string(),
            None => self
                .container_path
                .join("srcdest")
                .display()
                .to_string(),
        };
        let user = env::var("SUDO_USER").unwrap_or_else(|_| "root".to_string());

        debug!("Fetching sources as {} [SRCDEST={}]", user, srcdest);
        let status = Command::new("sudo")
            .args(["-u", &user, "--preserve-env=GNUPGHOME", "env"])
            .arg(format!("SRCDEST={}", srcdest))
            .arg(format!("BUILDDIR={}", builddir.path().display()))
            .arg("makepkg")
            .arg(format!("--config={}", makepkg_conf.display()))
            .args(["--verifysource", "-o"])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(BuildError::Sources)?;

        if !status.success() {
            return Err(BuildError::SourcesExit { status });
        }
        Ok(())
    }
}
