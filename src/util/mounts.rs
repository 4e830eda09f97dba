use std::ffi::CStr;
use std::io;
use std::path::Path;

/// Returns every mount point under `base`, deepest first, so that callers can
/// unmount nested mounts before the mounts they live on.
pub fn get_mounts(base: &Path) -> io::Result<Vec<String>> {
    let mut mounts = Vec::new();

    let system_mounts =
        unsafe { libc::setmntent(c"/proc/mounts".as_ptr(), c"r".as_ptr()) };

    if system_mounts.is_null() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "Failed to open /proc/mounts",
        ));
    }

    loop {
        let mnt = unsafe { libc::getmntent(system_mounts) };
        if mnt.is_null() {
            break;
        }

        let mnt_dir = String::from(unsafe {
            CStr::from_ptr((*mnt).mnt_dir).to_string_lossy()
        });

        if Path::new(&mnt_dir).starts_with(base) {
            mounts.push(mnt_dir);
        }
    }

    unsafe { libc::endmntent(system_mounts) };

    mounts.sort_by(|a, b| b.cmp(a));

    Ok(mounts)
}

/// True when `path` appears in the system mount table.
pub fn is_mounted(path: &Path) -> io::Result<bool> {
    Ok(get_mounts(path)?.iter().any(|m| Path::new(m) == path))
}
