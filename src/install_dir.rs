use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use log::{debug, info};
use crate::error::{UpdateError, UpdateResult};
use crate::ownership::InvokingUser;
use crate::platform::{is_on_search_path, Platform};

/// Marker line written above the PATH entry in shell profiles.
pub const PROFILE_MARKER: &str = "# Added by luaupdate";
/// Directory name under Program Files on Windows.
pub const WINDOWS_DIR_NAME: &str = "luau";

/// The parts of the process environment the resolver looks at.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Value of `PATH`.
    pub search_path: String,
    /// Value of `SHELL`, on Unix.
    pub shell: Option<String>,
    /// `ProgramFiles(x86)`, falling back to `ProgramFiles`, on Windows.
    pub program_files: Option<PathBuf>,
}

impl Environment {
    pub fn capture() -> Self {
        Self {
            search_path: std::env::var("PATH").unwrap_or_default(),
            shell: std::env::var("SHELL").ok(),
            program_files: std::env::var_os("ProgramFiles(x86)")
                .or_else(|| std::env::var_os("ProgramFiles"))
                .map(PathBuf::from),
        }
    }
}

/// How a new installation directory is put on the user's search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRegistration {
    /// Append an `export PATH=...` line to this shell profile.
    ShellProfile(PathBuf),
    /// Persist the new `PATH` with `setx`.
    Setx,
}

/// Where this run installs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDir {
    pub path: PathBuf,
    /// Set when the directory is missing and not on the search path yet.
    pub registration: Option<PathRegistration>,
}

impl InstallDir {
    /// An explicitly chosen directory, never registered on the search path.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            registration: None,
        }
    }

    /// Creates the directory and registers it on the search path if needed.
    ///
    /// # Errors
    /// Creation or registration failures are fatal for the run.
    pub fn prepare(&self, owner: &InvokingUser, env: &Environment) -> UpdateResult<()> {
        if !self.path.exists() {
            info!("Creating {}", self.path.display());
            fs::create_dir_all(&self.path).map_err(|e| UpdateError::install_dir(&self.path, e))?;
        }
        owner
            .assign(&self.path)
            .map_err(|e| UpdateError::install_dir(&self.path, e))?;

        match &self.registration {
            None => Ok(()),
            Some(PathRegistration::ShellProfile(profile)) => {
                append_to_profile(profile, &self.path, env.shell.as_deref())
                    .map_err(|e| UpdateError::install_dir(&self.path, format!("{}: {e}", profile.display())))?;
                owner
                    .assign(profile)
                    .map_err(|e| UpdateError::install_dir(&self.path, e))?;
                info!("Added {} to PATH in {}", self.path.display(), profile.display());
                Ok(())
            }
            Some(PathRegistration::Setx) => {
                let new_path = format!("{};{}", env.search_path, self.path.display());
                let status = Command::new("setx")
                    .args(["PATH", &new_path])
                    .status()
                    .map_err(|e| UpdateError::install_dir(&self.path, format!("could not run setx: {e}")))?;
                if !status.success() {
                    return Err(UpdateError::install_dir(&self.path, format!("setx exited with {status}")));
                }
                info!("Added {} to the user PATH", self.path.display());
                Ok(())
            }
        }
    }
}

/// Picks the installation directory for `platform`.
///
/// Returns `None` when there is no sensible location, e.g. on an unsupported
/// platform or without a home directory; callers then install next to the
/// downloaded artifact.
pub fn resolve(platform: &Platform, user: &InvokingUser, env: &Environment) -> Option<InstallDir> {
    let (path, registration) = if platform.is_unix() {
        let home = user.home.as_ref()?;
        let profile = shell_profile(home, env.shell.as_deref());
        (home.join("bin"), PathRegistration::ShellProfile(profile))
    } else if platform.is_windows() {
        let program_files = env.program_files.as_ref()?;
        (program_files.join(WINDOWS_DIR_NAME), PathRegistration::Setx)
    } else {
        return None;
    };

    let needs_registration = !path.exists() && !is_on_search_path(&path, &env.search_path);
    debug!(
        "Installation directory {} (register on PATH: {})",
        path.display(),
        needs_registration
    );
    Some(InstallDir {
        path,
        registration: needs_registration.then_some(registration),
    })
}

/// The profile file a PATH line should go into for the given shell.
pub fn shell_profile(home: &Path, shell: Option<&str>) -> PathBuf {
    let name = shell
        .and_then(|s| Path::new(s).file_name())
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match name {
        "zsh" => home.join(".zshrc"),
        "bash" => home.join(".bashrc"),
        "fish" => home.join(".config").join("fish").join("config.fish"),
        _ => home.join(".profile"),
    }
}

fn path_line(dir: &Path, shell: Option<&str>) -> String {
    let is_fish = shell.is_some_and(|s| s.ends_with("fish"));
    let escaped = dir
        .display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`");
    if is_fish {
        format!("fish_add_path \"{escaped}\"")
    } else {
        format!("export PATH=\"{escaped}:$PATH\"")
    }
}

/// Appends the PATH line unless the profile already mentions `dir`.
fn append_to_profile(profile: &Path, dir: &Path, shell: Option<&str>) -> std::io::Result<()> {
    let existing = fs::read_to_string(profile).unwrap_or_default();
    let line = path_line(dir, shell);
    if existing.contains(&line) {
        debug!("{} already adds {} to PATH", profile.display(), dir.display());
        return Ok(());
    }
    if let Some(parent) = profile.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(profile)?;
    let separator = if existing.is_empty() || existing.ends_with('\n') { "" } else { "\n" };
    write!(file, "{separator}\n{PROFILE_MARKER}\n{line}\n")
}
