use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info};

use super::{BuildError, Builder};

/// Artifact category (PKGDEST, LOGDEST, SRCPKGDEST) mapped to the files
/// moved out of the sandbox and where each one landed on the host.
pub type Products = BTreeMap<String, BTreeMap<String, PathBuf>>;

/// The fixed in-sandbox output directories and the makepkg.conf key naming
/// each one's host destination.
const CATEGORIES: [(&str, &str); 3] = [
    ("PKGDEST", "pkgdest"),
    ("LOGDEST", "logdest"),
    ("SRCPKGDEST", "srcpkgdest"),
];

impl Builder {
    /// Moves the build products out of the sandbox's fixed output
    /// directories to the destinations resolved from makepkg.conf, falling
    /// back to the process working directory for unset categories.
    pub(super) fn move_products(&mut self) -> Result<Products, BuildError> {
        let mut products = Products::new();

        for (category, dir) in CATEGORIES {
            let dest = self.makepkg.dest_or_cwd(category);
            let source = self.container_path.join(dir);
            debug!(
                "Moving {} artifacts {} -> {}",
                category,
                source.display(),
                dest.display()
            );

            let files =
                crate::util::copy_dir(&source, &dest).map_err(|source| {
                    BuildError::ArtifactMove {
                        category,
                        dest: dest.clone(),
                        source,
                    }
                })?;
            for file in files.keys() {
                info!("{}: {}", category, file);
            }
            products.insert(category.to_string(), files);
        }

        Ok(products)
    }
}
