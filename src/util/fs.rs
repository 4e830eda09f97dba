use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Joins `path` inside `root`, treating an absolute path as container-relative
/// so that `/etc/pacman.conf` lands at `<root>/etc/pacman.conf`.
pub fn rooted(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(rel) => root.join(rel),
        Err(_) => root.join(path),
    }
}

/// Creates `filename` under `root` with the given contents and mode, creating
/// any missing parent directories.
pub fn create_file(
    root: &Path,
    filename: &str,
    contents: &[u8],
    mode: u32,
) -> io::Result<()> {
    let path = rooted(root, Path::new(filename));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
    Ok(())
}
