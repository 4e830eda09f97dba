use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::mount::MsFlags;

use super::{Backend, BackendError, MARKER_FILE};
use crate::util::{
    check_path_for_mount_option_compatibility, get_mounts, is_mounted, mount,
};

/// Copy-on-write backend built on overlayfs. The base root lives at
/// `<dir>/root`; each snapshot `<name>` adds three sibling directories
/// (`<name>`, `<name>_upperdir`, `<name>_workdir`) with the merged union
/// view mounted at `<dir>/<name>`.
pub struct Overlay {
    dir: PathBuf,
    root: PathBuf,
    current: PathBuf,
}

struct SnapshotDirs {
    merged: PathBuf,
    upper: PathBuf,
    work: PathBuf,
}

impl Overlay {
    pub fn new(dir: impl Into<PathBuf>) -> Overlay {
        let dir = dir.into();
        let root = dir.join("root");
        Overlay {
            current: root.clone(),
            root,
            dir,
        }
    }

    /// The three deterministic locations of snapshot `name`, all siblings of
    /// the base root.
    fn snapshot_dirs(&self, name: &str) -> SnapshotDirs {
        SnapshotDirs {
            merged: self.dir.join(name),
            upper: self.dir.join(format!("{}_upperdir", name)),
            work: self.dir.join(format!("{}_workdir", name)),
        }
    }

    /// Rejects names whose snapshot paths would collide with the base root
    /// or escape the container directory, and names that cannot be embedded
    /// in the overlay mount options. Without this, a snapshot named `root`
    /// would make `remove_snapshot` delete the base root itself.
    fn validate_name(&self, name: &str) -> Result<(), BackendError> {
        if name.is_empty()
            || name == "root"
            || name == "."
            || name == ".."
            || name.contains('/')
            || check_path_for_mount_option_compatibility(Path::new(name))
                .is_err()
        {
            return Err(BackendError::InvalidSnapshotName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), BackendError> {
        match nix::mount::umount(target) {
            Ok(()) => {
                debug!("Unmounted {}", target.display());
                Ok(())
            }
            Err(nix::errno::Errno::EINVAL) | Err(nix::errno::Errno::ENOENT) => {
                /* Not a mount point (anymore); re-running cleanup is expected
                 * to hit this. */
                warn!(
                    "{} is not mounted, continuing cleanup",
                    target.display()
                );
                Ok(())
            }
            Err(e) => Err(BackendError::UnmountFailed {
                target: target.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Backend for Overlay {
    fn setup(&mut self) -> Result<PathBuf, BackendError> {
        check_path_for_mount_option_compatibility(&self.dir).map_err(|e| {
            BackendError::SetupFailed {
                path: self.dir.clone(),
                source: e,
            }
        })?;

        fs::create_dir_all(&self.root).map_err(|e| {
            BackendError::SetupFailed {
                path: self.root.clone(),
                source: e,
            }
        })?;

        let marker = self.root.join(MARKER_FILE);
        fs::write(&marker, "overlay").map_err(|e| {
            BackendError::SetupFailed {
                path: marker,
                source: e,
            }
        })?;

        Ok(self.root.clone())
    }

    fn add_snapshot(&mut self, name: &str) -> Result<PathBuf, BackendError> {
        self.validate_name(name)?;

        let dirs = self.snapshot_dirs(name);
        for path in [&dirs.merged, &dirs.upper, &dirs.work] {
            fs::create_dir_all(path).map_err(|e| BackendError::SetupFailed {
                path: path.clone(),
                source: e,
            })?;
        }

        let options = format!(
            "lowerdir={},upperdir={},workdir={}",
            self.root.display(),
            dirs.upper.display(),
            dirs.work.display()
        );
        debug!(
            "Mounting overlay at {} [{}]",
            dirs.merged.display(),
            options
        );

        /* If the mount is rejected the directories stay behind; callers
         * clean them up through remove_snapshot or destroy. */
        mount(
            Some("overlay"),
            &dirs.merged,
            Some("overlay"),
            MsFlags::empty(),
            Some(&options),
        )
        .map_err(|e| BackendError::MountFailed {
            target: dirs.merged.clone(),
            source: e,
        })?;

        self.current = dirs.merged.clone();
        Ok(dirs.merged)
    }

    fn remove_snapshot(&mut self, name: &str) -> Result<(), BackendError> {
        self.validate_name(name)?;

        let dirs = self.snapshot_dirs(name);

        let mounted = is_mounted(&dirs.merged).map_err(|e| {
            BackendError::CleanupFailed {
                path: dirs.merged.clone(),
                source: e,
            }
        })?;
        if mounted {
            self.unmount(&dirs.merged)?;
        } else {
            warn!(
                "{} is not mounted, continuing cleanup",
                dirs.merged.display()
            );
        }

        /* Upper and work go last so a failed merged-dir removal leaves the
         * snapshot recognizable. The base root is never touched. */
        for path in [&dirs.merged, &dirs.upper, &dirs.work] {
            if path.exists() {
                fs::remove_dir_all(path).map_err(|e| {
                    BackendError::CleanupFailed {
                        path: path.clone(),
                        source: e,
                    }
                })?;
            }
        }

        if self.current == dirs.merged {
            self.current = self.root.clone();
        }
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), BackendError> {
        /* Deepest mounts first so nested mounts come down before the
         * snapshots they live in. */
        let mounts = get_mounts(&self.dir).map_err(|e| {
            BackendError::CleanupFailed {
                path: PathBuf::from("/proc/mounts"),
                source: e,
            }
        })?;
        for target in mounts {
            self.unmount(Path::new(&target))?;
        }

        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| {
                BackendError::CleanupFailed {
                    path: self.dir.clone(),
                    source: e,
                }
            })?;
        }

        self.current = self.root.clone();
        Ok(())
    }

    fn get_path(&self) -> &Path {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_dirs_are_siblings_of_root() {
        let overlay = Overlay::new("/tmp/x");
        let dirs = overlay.snapshot_dirs("build1");
        assert_eq!(dirs.merged, PathBuf::from("/tmp/x/build1"));
        assert_eq!(dirs.upper, PathBuf::from("/tmp/x/build1_upperdir"));
        assert_eq!(dirs.work, PathBuf::from("/tmp/x/build1_workdir"));
        assert_ne!(dirs.merged, overlay.root);
    }

    #[test]
    fn test_setup_writes_marker_and_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("container");
        let mut overlay = Overlay::new(&dir);

        let root = overlay.setup().expect("setup");
        assert_eq!(root, dir.join("root"));
        assert_eq!(
            fs::read_to_string(root.join(MARKER_FILE)).expect("marker"),
            "overlay"
        );

        /* A second setup on an existing root must succeed unchanged */
        let again = overlay.setup().expect("setup again");
        assert_eq!(again, root);
    }

    #[test]
    fn test_get_path_defaults_to_root() {
        let overlay = Overlay::new("/tmp/x");
        assert_eq!(overlay.get_path(), Path::new("/tmp/x/root"));
    }

    #[test]
    fn test_remove_snapshot_tolerates_missing_mount_twice() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut overlay = Overlay::new(tmp.path().join("container"));
        overlay.setup().expect("setup");

        /* Simulate a fork whose mount failed after directory creation */
        let dirs = overlay.snapshot_dirs("build1");
        for path in [&dirs.merged, &dirs.upper, &dirs.work] {
            fs::create_dir_all(path).expect("mkdir");
        }

        overlay.remove_snapshot("build1").expect("first remove");
        assert!(!dirs.merged.exists());
        assert!(!dirs.upper.exists());
        assert!(!dirs.work.exists());

        /* Second removal only warns about the missing mount */
        overlay.remove_snapshot("build1").expect("second remove");
    }

    #[test]
    fn test_remove_snapshot_never_touches_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut overlay = Overlay::new(tmp.path().join("container"));
        let root = overlay.setup().expect("setup");
        fs::write(root.join("rootfile"), "keep me").expect("write");

        let dirs = overlay.snapshot_dirs("alice");
        for path in [&dirs.merged, &dirs.upper, &dirs.work] {
            fs::create_dir_all(path).expect("mkdir");
        }
        overlay.remove_snapshot("alice").expect("remove");

        assert_eq!(
            fs::read_to_string(root.join("rootfile")).expect("read"),
            "keep me"
        );
        assert_eq!(
            fs::read_to_string(root.join(MARKER_FILE)).expect("marker"),
            "overlay"
        );
    }

    #[test]
    fn test_destroy_removes_everything() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("container");
        let mut overlay = Overlay::new(&dir);
        overlay.setup().expect("setup");

        let dirs = overlay.snapshot_dirs("build1");
        for path in [&dirs.merged, &dirs.upper, &dirs.work] {
            fs::create_dir_all(path).expect("mkdir");
        }

        overlay.destroy().expect("destroy");
        assert!(!dir.exists());
        /* but nothing outside the container directory is touched */
        assert!(tmp.path().exists());

        /* destroying a container with zero snapshots is also fine */
        let mut fresh = Overlay::new(tmp.path().join("other"));
        fresh.setup().expect("setup");
        fresh.destroy().expect("destroy empty");
    }

    #[test]
    fn test_snapshot_named_root_never_touches_base_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut overlay = Overlay::new(tmp.path().join("container"));
        let root = overlay.setup().expect("setup");
        fs::write(root.join("rootfile"), "keep me").expect("write");

        assert!(matches!(
            overlay.add_snapshot("root"),
            Err(BackendError::InvalidSnapshotName { .. })
        ));
        assert!(matches!(
            overlay.remove_snapshot("root"),
            Err(BackendError::InvalidSnapshotName { .. })
        ));

        assert_eq!(
            fs::read_to_string(root.join("rootfile")).expect("read"),
            "keep me"
        );
        assert_eq!(
            fs::read_to_string(root.join(MARKER_FILE)).expect("marker"),
            "overlay"
        );
    }

    #[test]
    fn test_empty_snapshot_name_never_removes_container() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path().join("container");
        let mut overlay = Overlay::new(&dir);
        overlay.setup().expect("setup");

        assert!(matches!(
            overlay.remove_snapshot(""),
            Err(BackendError::InvalidSnapshotName { .. })
        ));
        assert!(dir.join("root").exists());
    }

    #[test]
    fn test_snapshot_names_cannot_escape_or_break_mount_options() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut overlay = Overlay::new(tmp.path().join("container"));
        overlay.setup().expect("setup");

        for name in ["../outside", "a/b", ".", "..", "has,comma", "has space"]
        {
            assert!(
                matches!(
                    overlay.add_snapshot(name),
                    Err(BackendError::InvalidSnapshotName { .. })
                ),
                "name {} was accepted",
                name
            );
        }
    }

    #[test]
    fn test_setup_rejects_paths_unsafe_for_mount_options() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut overlay = Overlay::new(tmp.path().join("has,comma"));
        assert!(matches!(
            overlay.setup(),
            Err(BackendError::SetupFailed { .. })
        ));
    }
}
