use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Minimal pacman.conf reader covering exactly what the builder needs:
/// ordered repository server lists, ordered cache directories, and the
/// Include files that have to be copied into the container alongside the
/// main configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacmanConf {
    pub cache_dirs: Vec<PathBuf>,
    pub includes: Vec<PathBuf>,
    pub repos: Vec<Repo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub name: String,
    pub servers: Vec<String>,
}

impl PacmanConf {
    pub fn load(path: &Path) -> io::Result<PacmanConf> {
        let mut conf = PacmanConf::parse(&fs::read_to_string(path)?);
        if conf.cache_dirs.is_empty() {
            conf.cache_dirs.push(PathBuf::from("/var/cache/pacman/pkg"));
        }
        Ok(conf)
    }

    pub fn parse(input: &str) -> PacmanConf {
        let mut conf = PacmanConf::default();
        let mut section = String::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                if section != "options" {
                    conf.repos.push(Repo {
                        name: section.clone(),
                        servers: Vec::new(),
                    });
                }
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => continue, // bare flags like ILoveCandy
            };

            match key {
                "CacheDir" => {
                    /* pacman allows several directories on one line */
                    conf.cache_dirs
                        .extend(value.split_whitespace().map(PathBuf::from));
                }
                "Include" => conf.includes.push(PathBuf::from(value)),
                "Server" => {
                    if let Some(repo) = conf
                        .repos
                        .iter_mut()
                        .find(|r| r.name == section)
                    {
                        repo.servers.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        conf
    }

    /// The first server of the [core] repository with the `$repo` suffix
    /// stripped, suitable as a download mirror base.
    pub fn core_mirror(&self) -> Option<String> {
        let repo = self.repos.iter().find(|r| r.name == "core")?;
        let server = repo.servers.first()?;
        let base = match server.find("$repo") {
            Some(idx) => &server[..idx],
            None => server.as_str(),
        };
        Some(base.to_string())
    }

    /// Servers of the [core] repository; the only ones synchronized into the
    /// container's mirrorlist so we don't contaminate it with mirrors we
    /// don't want.
    pub fn core_servers(&self) -> Vec<&str> {
        self.repos
            .iter()
            .find(|r| r.name == "core")
            .map(|r| r.servers.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE: &str = "\
# /etc/pacman.conf
[options]
HoldPkg = pacman glibc
CacheDir = /var/cache/pacman/pkg /mnt/shared/pkg
ILoveCandy
Include = /etc/pacman.d/flags

[core]
Server = https://mirror.example.org/archlinux/$repo/os/$arch
Include = /etc/pacman.d/mirrorlist

[extra]
Server = https://mirror.example.org/archlinux/$repo/os/$arch
";

    #[test]
    fn test_parse_cache_dirs_and_includes() {
        let conf = PacmanConf::parse(SAMPLE);
        assert_eq!(
            conf.cache_dirs,
            vec![
                PathBuf::from("/var/cache/pacman/pkg"),
                PathBuf::from("/mnt/shared/pkg"),
            ]
        );
        assert_eq!(
            conf.includes,
            vec![
                PathBuf::from("/etc/pacman.d/flags"),
                PathBuf::from("/etc/pacman.d/mirrorlist"),
            ]
        );
    }

    #[test]
    fn test_parse_repos_in_order() {
        let conf = PacmanConf::parse(SAMPLE);
        let names: Vec<&str> =
            conf.repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["core", "extra"]);
        assert_eq!(
            conf.core_servers(),
            vec!["https://mirror.example.org/archlinux/$repo/os/$arch"]
        );
    }

    #[rstest]
    #[case(
        "https://mirror.example.org/archlinux/$repo/os/$arch",
        "https://mirror.example.org/archlinux/"
    )]
    #[case("https://mirror.example.org/core", "https://mirror.example.org/core")]
    fn test_core_mirror_strips_repo_variable(
        #[case] server: &str,
        #[case] expected: &str,
    ) {
        let conf = PacmanConf {
            repos: vec![Repo {
                name: "core".to_string(),
                servers: vec![server.to_string()],
            }],
            ..Default::default()
        };
        assert_eq!(conf.core_mirror().expect("mirror"), expected);
    }

    #[test]
    fn test_core_mirror_absent() {
        assert_eq!(PacmanConf::default().core_mirror(), None);
        assert!(PacmanConf::default().core_servers().is_empty());
    }

    #[test]
    fn test_load_defaults_cache_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("pacman.conf");
        std::fs::write(&path, "[options]\n").expect("write");
        let conf = PacmanConf::load(&path).expect("load");
        assert_eq!(
            conf.cache_dirs,
            vec![PathBuf::from("/var/cache/pacman/pkg")]
        );
    }
}
