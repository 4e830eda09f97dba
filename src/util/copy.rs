use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use log::trace;
use walkdir::WalkDir;

/// Copies a single file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(())
}

/// Recursively copies `src` into `dst` and returns a map of relative file
/// names to the paths they were copied to. Symlinks are recreated rather than
/// followed; special files (sockets, fifos) are skipped. A missing source
/// directory yields an empty map so that optional artifact directories don't
/// fail the copy.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<BTreeMap<String, PathBuf>> {
    let mut copied = BTreeMap::new();

    if !src.exists() {
        return Ok(copied);
    }

    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if target.exists() {
                fs::remove_file(&target)?;
            }
            symlink(&link, &target)?;
        } else if file_type.is_file() {
            trace!(
                "Copying {} -> {}",
                entry.path().display(),
                target.display()
            );
            copy_file(entry.path(), &target)?;
            copied.insert(rel.to_string_lossy().into_owned(), target);
        }
        /* anything else (sockets, fifos) is not worth carrying over */
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_file_creates_parents() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("a.txt");
        fs::write(&src, "contents")?;

        let dst = tmp.path().join("deeply/nested/a.txt");
        copy_file(&src, &dst)?;
        assert_eq!(fs::read_to_string(&dst)?, "contents");
        Ok(())
    }

    #[test]
    fn test_copy_dir_returns_copied_files() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("sub"))?;
        fs::write(src.join("one.pkg.tar.zst"), "one")?;
        fs::write(src.join("sub/two.log"), "two")?;

        let dst = tmp.path().join("dst");
        let copied = copy_dir(&src, &dst)?;

        assert_eq!(copied.len(), 2);
        assert_eq!(
            copied.get("one.pkg.tar.zst"),
            Some(&dst.join("one.pkg.tar.zst"))
        );
        assert_eq!(fs::read_to_string(dst.join("sub/two.log"))?, "two");
        Ok(())
    }

    #[test]
    fn test_copy_dir_missing_source_is_empty() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let copied =
            copy_dir(&tmp.path().join("nope"), &tmp.path().join("dst"))?;
        assert!(copied.is_empty());
        Ok(())
    }

    #[test]
    fn test_copy_dir_recreates_symlinks() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("src");
        fs::create_dir_all(&src)?;
        fs::write(src.join("real"), "real")?;
        symlink("real", src.join("link"))?;

        let dst = tmp.path().join("dst");
        copy_dir(&src, &dst)?;
        assert_eq!(fs::read_link(dst.join("link"))?, PathBuf::from("real"));
        Ok(())
    }
}
