use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{Datelike, Local, NaiveDate};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use tar::Archive;

use super::{Bootstrap, ProvisionError};

const CACHE_DIR: &str = "/var/cache/buildpkg";

/// Populates the root from the monthly Arch bootstrap tarball: download it
/// (and its detached signature) from a core mirror, verify with gpg, and
/// unpack it into the root. Downloads are cached so repeated provisioning
/// only pays the network cost once a month.
pub struct Archiso {
    mirror: String,
    tarball_name: String,
    cache_dir: PathBuf,
}

impl Archiso {
    pub fn new(mirror: &str) -> Archiso {
        let today = Local::now().date_naive();
        Archiso {
            mirror: format!("{}iso/latest/", mirror),
            tarball_name: bootstrap_tarball_name(today),
            cache_dir: PathBuf::from(CACHE_DIR),
        }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), ProvisionError> {
        info!("Downloading {}...", url);
        let status = Command::new("curl")
            .args(["-fL", "-o"])
            .arg(dest)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| ProvisionError::Spawn {
                program: "curl".to_string(),
                source: e,
            })?;
        if !status.success() {
            return Err(ProvisionError::Exit {
                program: "curl".to_string(),
                status,
            });
        }
        Ok(())
    }

    fn verify_signature(&self, file: &Path, sig: &Path) -> Result<(), ProvisionError> {
        let status = Command::new("gpg")
            .arg("--verify")
            .arg(sig)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| ProvisionError::Spawn {
                program: "gpg".to_string(),
                source: e,
            })?;
        if !status.success() {
            return Err(ProvisionError::BadSignature {
                file: file.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Downloads (or reuses) the verified bootstrap tarball and returns its
    /// path in the cache.
    fn fetch_tarball(&self) -> Result<PathBuf, ProvisionError> {
        fs::create_dir_all(&self.cache_dir).map_err(|e| ProvisionError::Io {
            path: self.cache_dir.clone(),
            source: e,
        })?;

        let tarball = self.cache_dir.join(&self.tarball_name);
        if !tarball.exists() {
            let url = format!("{}{}", self.mirror, self.tarball_name);
            let sig = tarball.with_extension("gz.sig");
            self.download(&url, &tarball)?;
            self.download(&format!("{}.sig", url), &sig)?;
            self.verify_or_discard(&tarball, &sig)?;
        } else {
            debug!("Reusing cached {}", tarball.display());
        }
        Ok(tarball)
    }

    /// Only verified tarballs may stay in the cache: the cached-download
    /// fast path trusts whatever it finds there, so a download that fails
    /// verification is deleted along with its signature.
    fn verify_or_discard(
        &self,
        tarball: &Path,
        sig: &Path,
    ) -> Result<(), ProvisionError> {
        if let Err(e) = self.verify_signature(tarball, sig) {
            warn!("Discarding unverified {}", tarball.display());
            if let Err(e) = fs::remove_file(tarball) {
                warn!("Could not remove {}: {}", tarball.display(), e);
            }
            let _ = fs::remove_file(sig);
            return Err(e);
        }
        Ok(())
    }
}

impl Bootstrap for Archiso {
    fn populate(&self, root: &Path) -> Result<(), ProvisionError> {
        let tarball = self.fetch_tarball()?;

        info!("Unpacking {}...", tarball.display());
        unpack_stripped(&tarball, root)
    }
}

/// Unpacks a gzipped tarball into `root`, stripping the archive's single
/// top-level directory (`root.x86_64/` in the bootstrap tarball).
fn unpack_stripped(tarball: &Path, root: &Path) -> Result<(), ProvisionError> {
    let io_err = |source| ProvisionError::Unpack {
        archive: tarball.to_path_buf(),
        source,
    };

    let file = File::open(tarball).map_err(io_err)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let stripped: PathBuf = entry
            .path()
            .map_err(io_err)?
            .components()
            .skip(1)
            .collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        /* The bootstrap tarball does not carry a directory entry for every
         * parent, so materialize them before unpacking. */
        let dest = root.join(stripped);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        entry.unpack(&dest).map_err(io_err)?;
    }

    Ok(())
}

/// `archlinux-bootstrap-<YYYY.MM>.01-x86_64.tar.gz` for the given date.
fn bootstrap_tarball_name(date: NaiveDate) -> String {
    format!(
        "archlinux-bootstrap-{:04}.{:02}.01-x86_64.tar.gz",
        date.year(),
        date.month()
    )
}
