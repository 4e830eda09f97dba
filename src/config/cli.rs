use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Build packages inside disposable copy-on-write containers", long_about = None)]
pub struct Args {
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Container directory holding the base root and its snapshots.
    /// Defaults to `/var/lib/buildpkg`
    #[arg(long, global = true)]
    pub path: Option<String>,

    /// Name of the build snapshot, defaults to $SUDO_USER
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Snapshot backend variant
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Bootstrap provider for the initial root filesystem (archiso or
    /// pacstrap). Defaults to pacstrap when the host has it.
    #[arg(long, global = true)]
    pub bootstrap: Option<String>,

    /// Location of the pacman configuration file
    #[arg(long, global = true)]
    pub pacman_conf: Option<String>,

    /// Location of the makepkg configuration file
    #[arg(long, global = true)]
    pub makepkg_conf: Option<String>,

    /// Print the moved build products as a JSON blob
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum Action {
    /// Build the package in the current directory inside a fresh snapshot
    /// of the base root (the default action)
    Build,

    /// Provision a container without building anything
    Create {
        /// Directory to provision the container in
        #[arg(value_name = "DIR")]
        dir: String,
    },

    /// Tear down a container, rediscovering its backend from the marker file
    Destroy {
        /// Directory of the container to tear down
        #[arg(value_name = "DIR")]
        dir: String,
    },
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
