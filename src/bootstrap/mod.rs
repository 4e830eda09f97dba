mod archiso;
mod pacstrap;

pub use archiso::Archiso;
pub use pacstrap::Pacstrap;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: ExitStatus },

    #[error("failed to unpack {archive}")]
    Unpack {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("signature check failed for {file}")]
    BadSignature { file: PathBuf },

    #[error("failed to stage {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Supplies the initial filesystem contents of a base root. The orchestrator
/// only needs this one operation.
pub trait Bootstrap {
    fn populate(&self, root: &Path) -> Result<(), ProvisionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapKind {
    Archiso,
    Pacstrap,
}

/// Pacstrap when the host has it, the bootstrap tarball otherwise.
pub fn default_bootstrap() -> BootstrapKind {
    if Path::new("/usr/bin/pacstrap").exists() {
        BootstrapKind::Pacstrap
    } else {
        BootstrapKind::Archiso
    }
}

impl FromStr for BootstrapKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archiso" => Ok(BootstrapKind::Archiso),
            "pacstrap" => Ok(BootstrapKind::Pacstrap),
            _ => Err(anyhow::anyhow!(
                "Unknown bootstrap: '{}'. Valid bootstraps are: archiso, pacstrap",
                s
            )),
        }
    }
}

impl fmt::Display for BootstrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapKind::Archiso => write!(f, "archiso"),
            BootstrapKind::Pacstrap => write!(f, "pacstrap"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_kind_round_trip() {
        assert_eq!(
            "archiso".parse::<BootstrapKind>().expect("parse"),
            BootstrapKind::Archiso
        );
        assert_eq!(
            "pacstrap".parse::<BootstrapKind>().expect("parse"),
            BootstrapKind::Pacstrap
        );
        assert!("debootstrap".parse::<BootstrapKind>().is_err());
        assert_eq!(BootstrapKind::Archiso.to_string(), "archiso");
    }
}
