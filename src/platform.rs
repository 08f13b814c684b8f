use std::fmt;
use std::path::Path;
use log::debug;
use regex::Regex;

/// The only Linux distribution that upstream publishes a prebuilt bundle for.
pub const PREBUILT_LINUX_DISTRO: &str = "ubuntu";

const OS_RELEASE: &str = "/etc/os-release";

/// The running platform, as far as release asset selection cares.
///
/// This is the only place in the crate that looks at the raw operating system.
/// Everything downstream works with the resolved asset name or the
/// installation directory computed from a `Platform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// Linux, with the `ID` from `/etc/os-release` when it could be read.
    Linux { distro: Option<String> },
    MacOs,
    Windows,
    /// Anything else, carrying the OS name for error messages.
    Unsupported(String),
}

impl Platform {
    /// Probes the host this process runs on.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => {
                let distro = std::fs::read_to_string(OS_RELEASE)
                    .ok()
                    .and_then(|content| parse_os_release_id(&content));
                debug!("Detected Linux distribution: {:?}", distro);
                Platform::Linux { distro }
            }
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            other => Platform::Unsupported(other.to_string()),
        }
    }

    /// Parses a user supplied platform name, e.g. from `--platform`.
    ///
    /// Accepts `macos`, `windows`, `linux`, `linux-<distro>` and a bare distro
    /// id such as `ubuntu`. Unknown names become [`Platform::Unsupported`].
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "macos" | "darwin" | "osx" => Platform::MacOs,
            "windows" | "win32" => Platform::Windows,
            "linux" => Platform::Linux { distro: None },
            PREBUILT_LINUX_DISTRO => Platform::Linux { distro: Some(name) },
            _ => match name.strip_prefix("linux-") {
                Some(distro) if !distro.is_empty() => Platform::Linux {
                    distro: Some(distro.to_string()),
                },
                _ => Platform::Unsupported(name),
            },
        }
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Platform::Linux { .. } | Platform::MacOs)
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// File extension of executables produced for this platform.
    pub fn executable_extension(&self) -> &'static str {
        match self {
            Platform::Windows => "exe",
            _ => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux { distro: Some(distro) } => write!(f, "linux ({distro})"),
            Platform::Linux { distro: None } => write!(f, "linux"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
            Platform::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// Maps a platform to the name of the prebuilt release asset for it.
///
/// Returns `None` when upstream publishes no binary for the platform; the
/// caller then falls back to the source archive.
pub fn resolve_asset_identifier(platform: &Platform) -> Option<String> {
    let flavor = match platform {
        Platform::Linux { distro: Some(distro) } if distro == PREBUILT_LINUX_DISTRO => distro.as_str(),
        Platform::MacOs => "macos",
        Platform::Windows => "windows",
        _ => return None,
    };
    Some(format!("luau-{flavor}.zip"))
}

/// Extracts the lowercased `ID` value from the contents of an `os-release` file.
pub fn parse_os_release_id(content: &str) -> Option<String> {
    let re = Regex::new(r#"(?m)^ID=["']?([^"'\r\n]+)["']?\s*$"#).ok()?;
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_ascii_lowercase())
        .filter(|id| !id.is_empty())
}

/// Whether `dir` is one of the entries in a `PATH`-style variable.
pub fn is_on_search_path(dir: &Path, search_path: &str) -> bool {
    std::env::split_paths(search_path).any(|entry| entry == dir)
}
