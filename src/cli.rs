use std::path::PathBuf;
use clap::{ArgAction, Parser};

/// Installs the latest Luau release, or does nothing if it is already installed.
///
/// Exits with 0 after installing, 1 when already up to date, 2 to 9 on
/// failure and 64 on invalid usage.
#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    /// Cache root holding `.settings.json` and downloaded artifacts
    #[clap(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
    /// Install into this directory instead of the platform default. The
    /// directory is not added to PATH
    #[clap(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
    /// Select assets for this platform instead of the detected one
    /// (`macos`, `windows`, `ubuntu`, `linux-<distro>`)
    #[clap(long, value_name = "NAME")]
    pub platform: Option<String>,
    /// Latest-release endpoint to query
    #[clap(long, value_name = "URL")]
    pub api_url: Option<String>,
    /// Network timeout in seconds
    #[clap(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Configuration file. Defaults to `luaupdate.toml` if present
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Reinstall even if the latest release is already installed
    #[clap(short, long)]
    pub force: bool,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Only print errors
    #[clap(short, long)]
    pub quiet: bool,
}

impl CLI {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
