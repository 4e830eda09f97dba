use log::{debug, error};
use nix::errno::Errno;
use nix::mount::MsFlags;
use std::io;
use std::path::Path;

/// Thin wrapper around mount(2) that logs the full invocation on failure.
pub fn mount(
    source: Option<&str>,
    target: &Path,
    fstype: Option<&str>,
    flags: MsFlags,
    data: Option<&str>,
) -> Result<(), Errno> {
    if let Err(e) = nix::mount::mount(source, target, fstype, flags, data) {
        debug!(
            "mount {} on {} failed [type={}, flags={}, data={}]: {}",
            source.unwrap_or("none"),
            target.display(),
            fstype.unwrap_or("none"),
            flags.bits(),
            data.unwrap_or(""),
            e
        );

        if e == Errno::EINVAL && fstype == Some("overlay") {
            /* The kernel refuses to stack more than two levels of overlayfs,
             * which is what EINVAL usually means when the lower directory is
             * itself an overlay (e.g. running inside docker). */
            error!(
                "Overlay mount rejected; if the container directory lives on \
                 an overlay filesystem the kernel's stacking depth limit may \
                 have been reached"
            );
        }

        return Err(e);
    }

    Ok(())
}

/**
 * Checks a container path to ensure it's a valid path for our overlayfs mount
 * options. Overlayfs separates lowerdir/upperdir/workdir with commas and
 * colons, and we don't attempt to escape them.
 */
pub fn check_path_for_mount_option_compatibility(path: &Path) -> io::Result<()> {
    if path.components().count() == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Container path {} is empty", path.display()),
        ));
    }

    path.components().try_for_each(|component| {
        let component_str = match component.as_os_str().to_str() {
            Some(s) => s,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Container path {} contains invalid character",
                        path.display()
                    ),
                ));
            }
        };

        if !component_str.chars().all(|c| {
            c.is_alphanumeric()
                || c == '_'
                || c == '-'
                || c == '.'
                || c == '/'
                || c == '@'
                || c == '%'
        }) {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Container path {} contains invalid character {}",
                    path.display(),
                    component_str
                ),
            ))
        } else {
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    use super::*;

    #[test]
    fn test_check_path_for_mount_option_compatibility() {
        let path = Path::new("/var/lib/buildpkg");
        assert!(check_path_for_mount_option_compatibility(path).is_ok());
    }

    #[test]
    fn test_check_path_for_mount_option_no_spaces() {
        let path = Path::new("/var/lib/build pkg");
        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }

    #[test]
    fn test_check_path_for_mount_option_no_commas() {
        let path = Path::new("/var/lib/build,pkg");
        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }

    #[test]
    fn test_check_path_for_mount_option_compatibility_empty() {
        let path = Path::new("");
        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }

    #[test]
    fn test_check_path_for_mount_option_compatibility_non_utf8() {
        let invalid_utf8 = vec![0xFF, 0xFF];
        let os_string = OsString::from_vec(invalid_utf8);
        let path = Path::new(&os_string);

        assert!(check_path_for_mount_option_compatibility(path).is_err());
    }
}
