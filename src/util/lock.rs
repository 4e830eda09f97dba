use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::trace;
use nix::fcntl::Flock;

use anyhow::{Result, anyhow};

/// Exclusive advisory lock keyed by the container directory. Exactly one
/// orchestrator may operate on a root at a time; mount and unmount of the
/// same snapshot name from two processes is undefined.
pub struct Lock {
    path: PathBuf,
    #[allow(dead_code)]
    lock: Flock<File>,
}

impl Lock {
    pub fn container(dir: &Path) -> Result<Lock> {
        let lock_file = PathBuf::from(format!("{}.lock", dir.display()));
        trace!("Acquiring lock {}", lock_file.display());
        let file = match OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_file)
        {
            Ok(file) => file,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to open lock file for container {}: {}",
                    dir.display(),
                    e
                ));
            }
        };

        let lock =
            nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive)
                .map_err(|(_, e)| anyhow!("Failed to acquire lock: {}", e))?;

        trace!("Acquired lock {}", lock_file.display());
        Ok(Lock {
            path: lock_file,
            lock,
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        trace!("Unlocking lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_and_relock() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("container");

        let lock = Lock::container(&dir)?;
        drop(lock);

        /* Releasing the lock must allow a subsequent acquisition */
        let _relock = Lock::container(&dir)?;
        Ok(())
    }
}
