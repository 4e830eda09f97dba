use std::env;

use super::{BuildError, Builder};
use crate::container::Container;
use crate::util::create_file;

impl Builder {
    /// Per-snapshot setup applied right after fork: a fresh keyring copy,
    /// the unprivileged build user, the build directory layout, and the
    /// default makepkg destinations.
    pub(super) fn setup_snapshot(&mut self) -> Result<(), BuildError> {
        self.setup_gnupg()?;
        self.setup_user()?;
        self.setup_build_dirs()?;
        self.setup_makepkg_defaults()
    }

    /// Creates the builduser the build runs as, with the invoking user's
    /// uid so artifacts written through binds stay owned by them, and a
    /// sudoers drop-in so makepkg can install dependencies.
    fn setup_user(&mut self) -> Result<(), BuildError> {
        let uid = env::var("SUDO_UID").unwrap_or_else(|_| "1000".to_string());
        self.container.exec(&format!(
            "useradd -m -G wheel -d /build -u {} -s /bin/bash builduser",
            uid
        ))?;

        create_file(
            &self.container_path,
            "/etc/sudoers.d/builduser-pacman",
            b"builduser ALL = NOPASSWD: /usr/bin/pacman\n",
            0o440,
        )
        .map_err(|source| BuildError::ConfigSync {
            what: "sudoers drop-in",
            source,
        })?;
        Ok(())
    }

    /// Creates the fixed in-sandbox directories makepkg works against.
    fn setup_build_dirs(&mut self) -> Result<(), BuildError> {
        self.container.exec(
            "install -d -o builduser /build /startdir /pkgdest /srcpkgdest /srcdest /logdest",
        )?;
        Ok(())
    }

    /// Writes the builduser's makepkg defaults pointing every destination
    /// at the fixed in-sandbox directories, carrying over MAKEFLAGS and
    /// PACKAGER from the host configuration.
    fn setup_makepkg_defaults(&mut self) -> Result<(), BuildError> {
        let mut defaults = vec![
            "BUILDDIR=/build".to_string(),
            "PKGDEST=/pkgdest".to_string(),
            "SRCPKGDEST=/srcpkgdest".to_string(),
            "SRCDEST=/srcdest".to_string(),
            "LOGDEST=/logdest".to_string(),
        ];
        if let Some(makeflags) = self.makepkg.get("MAKEFLAGS") {
            defaults.push(format!("MAKEFLAGS={}", makeflags));
        }
        if let Some(packager) = self.makepkg.get("PACKAGER") {
            defaults.push(format!("PACKAGER={}", packager));
        }

        let contents = format!("{}\n", defaults.join("\n"));
        create_file(
            &self.container_path,
            "/build/.makepkg.conf",
            contents.as_bytes(),
            0o644,
        )
        .map_err(|source| BuildError::ConfigSync {
            what: "makepkg defaults",
            source,
        })?;
        Ok(())
    }
}
