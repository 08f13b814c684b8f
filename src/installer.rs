use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use flate2::read::GzDecoder;
use log::{debug, info};
use walkdir::WalkDir;
use crate::error::{UpdateError, UpdateResult};
use crate::ownership::{is_executable, make_executable, InvokingUser};

/// Executables produced by a source build, without platform extension.
pub const BUILT_EXECUTABLES: [&str; 2] = ["luau", "luau-analyze"];
/// CMake targets that produce [`BUILT_EXECUTABLES`].
pub const BUILD_TARGETS: [&str; 2] = ["Luau.Repl.CLI", "Luau.Analyze.CLI"];

/// How a fetched artifact becomes an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// A prebuilt archive whose entries are the installation.
    BinaryBundle,
    /// A source snapshot that has to be compiled after extraction.
    SourceBuild,
}

/// Compiles extracted sources into executables.
pub trait SourceBuilder {
    /// Whether the build tool can be run on this machine at all.
    fn is_available(&self) -> bool;

    /// Builds the tree at `source_dir` and places the resulting executables
    /// in `target`, returning their paths.
    ///
    /// # Errors
    /// Any failure of the build tool is an [`UpdateError::Build`].
    fn build(&self, source_dir: &Path, target: &Path) -> UpdateResult<Vec<PathBuf>>;
}

/// [`SourceBuilder`] driving the upstream CMake build.
#[derive(Debug, Clone)]
pub struct CMakeBuilder {
    pub program: String,
    /// Extension of produced executables, e.g. `exe` on Windows.
    pub executable_extension: String,
}

impl CMakeBuilder {
    pub fn new(executable_extension: &str) -> Self {
        Self {
            program: "cmake".to_string(),
            executable_extension: executable_extension.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> UpdateResult<()> {
        debug!("Running {} {}", self.program, args.join(" "));
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|e| UpdateError::Build(format!("could not run {}: {e}", self.program)))?;
        if !status.success() {
            return Err(UpdateError::Build(format!(
                "`{} {}` exited with {status}",
                self.program,
                args.join(" ")
            )));
        }
        Ok(())
    }
}

impl SourceBuilder for CMakeBuilder {
    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn build(&self, source_dir: &Path, target: &Path) -> UpdateResult<Vec<PathBuf>> {
        let build_dir = source_dir.join("build");
        let source = source_dir.to_string_lossy().to_string();
        let build = build_dir.to_string_lossy().to_string();

        info!("Configuring source build in {}", build_dir.display());
        self.run(&["-S", &source, "-B", &build, "-DCMAKE_BUILD_TYPE=Release"])?;

        info!("Building {}", BUILD_TARGETS.join(", "));
        let mut args = vec!["--build", build.as_str(), "--config", "Release", "--target"];
        args.extend(BUILD_TARGETS);
        self.run(&args)?;

        let built = find_built_executables(&build_dir, &self.executable_extension);
        if built.is_empty() {
            return Err(UpdateError::Build(format!(
                "no executables found in {}",
                build_dir.display()
            )));
        }

        fs::create_dir_all(target).map_err(|e| UpdateError::Build(format!("{}: {e}", target.display())))?;
        let mut installed = Vec::new();
        for exe in built {
            let Some(name) = exe.file_name() else { continue };
            let dest = target.join(name);
            replace_file(&exe, &dest)
                .and_then(|()| make_executable(&dest))
                .map_err(|e| UpdateError::Build(format!("could not install {}: {e}", dest.display())))?;
            installed.push(dest);
        }
        Ok(installed)
    }
}

/// Finds the first build output for each of [`BUILT_EXECUTABLES`].
fn find_built_executables(build_dir: &Path, extension: &str) -> Vec<PathBuf> {
    let wanted: Vec<String> = BUILT_EXECUTABLES
        .iter()
        .map(|name| {
            if extension.is_empty() {
                name.to_string()
            } else {
                format!("{name}.{extension}")
            }
        })
        .collect();

    let mut found: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(build_dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let already = found.iter().any(|p| p.file_name().and_then(|n| n.to_str()) == Some(name));
        if entry.file_type().is_file() && wanted.iter().any(|w| w == name) && !already && is_executable(path) {
            found.push(path.to_path_buf());
        }
    }
    found
}

/// Installs artifacts into a target directory.
pub struct Installer {
    owner: InvokingUser,
    builder: Box<dyn SourceBuilder>,
}

impl Installer {
    pub fn new(owner: InvokingUser, builder: Box<dyn SourceBuilder>) -> Self {
        Self { owner, builder }
    }

    /// Whether [`InstallStrategy::SourceBuild`] can work on this machine.
    pub fn can_build_from_source(&self) -> bool {
        self.builder.is_available()
    }

    /// Installs `artifact` into `target` according to `strategy`.
    ///
    /// Returns the files that were written. A failed install may leave some
    /// files behind in `target`; it never touches the cache's own records.
    pub fn install(
        &self,
        strategy: InstallStrategy,
        artifact: &Path,
        target: &Path,
    ) -> UpdateResult<Vec<PathBuf>> {
        let written = match strategy {
            InstallStrategy::BinaryBundle => self.install_bundle(artifact, target)?,
            InstallStrategy::SourceBuild => self.install_from_source(artifact, target)?,
        };
        for path in &written {
            self.owner
                .assign(path)
                .map_err(|e| UpdateError::extraction(artifact, format!("{}: {e}", path.display())))?;
        }
        Ok(written.into_iter().filter(|p| p.is_file()).collect())
    }

    fn install_bundle(&self, artifact: &Path, target: &Path) -> UpdateResult<Vec<PathBuf>> {
        info!("Extracting {} into {}", artifact.display(), target.display());
        let written = extract_archive(artifact, target)?;
        for path in written.iter().filter(|p| p.is_file()) {
            if path.extension().is_none() && !is_executable(path) {
                make_executable(path).map_err(|e| UpdateError::extraction(artifact, e))?;
            }
        }
        Ok(written)
    }

    fn install_from_source(&self, artifact: &Path, target: &Path) -> UpdateResult<Vec<PathBuf>> {
        let staging = tempfile::Builder::new()
            .prefix("luaupdate-build-")
            .tempdir()
            .map_err(|e| UpdateError::extraction(artifact, format!("could not create build directory: {e}")))?;
        info!("Extracting sources into {}", staging.path().display());
        extract_archive(artifact, staging.path())?;

        let source_root = single_top_level_dir(staging.path()).unwrap_or_else(|| staging.path().to_path_buf());
        let built = self.builder.build(&source_root, target);
        if let Err(e) = staging.close() {
            debug!("Could not remove build directory: {}", e);
        }
        built
    }
}

/// Extracts a `.zip` or `.tar.gz` archive into `dest`.
///
/// Entry paths are kept relative to `dest`; existing files are replaced.
/// Returns every file and directory that was created.
pub fn extract_archive(archive: &Path, dest: &Path) -> UpdateResult<Vec<PathBuf>> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    fs::create_dir_all(dest).map_err(|e| UpdateError::extraction(archive, format!("{}: {e}", dest.display())))?;
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive, dest)
    } else {
        extract_zip(archive, dest)
    }
}

/// Extracts a ZIP archive, copying each entry's decompressed bytes.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> UpdateResult<Vec<PathBuf>> {
    let file = fs::File::open(archive_path).map_err(|e| UpdateError::extraction(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| UpdateError::extraction(archive_path, e))?;

    let mut written = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::extraction(archive_path, format!("entry {i}: {e}")))?;
        let relative = entry
            .enclosed_name()
            .filter(|p| is_safe_relative(p))
            .ok_or_else(|| {
                UpdateError::extraction(archive_path, format!("refusing unsafe entry path {}", entry.name()))
            })?;
        let output = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&output).map_err(|e| write_error(archive_path, &output, e))?;
        } else {
            prepare_destination(&output).map_err(|e| write_error(archive_path, &output, e))?;
            let mut outfile = fs::File::create(&output).map_err(|e| write_error(archive_path, &output, e))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| write_error(archive_path, &output, e))?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&output, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| write_error(archive_path, &output, e))?;
            }
        }

        debug!("Extracted {}", output.display());
        written.push(output);
    }
    Ok(written)
}

/// Extracts a gzip-compressed tarball with the same rules as [`extract_zip`].
pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> UpdateResult<Vec<PathBuf>> {
    let file = fs::File::open(archive_path).map_err(|e| UpdateError::extraction(archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| UpdateError::extraction(archive_path, e))?;

    let mut written = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| UpdateError::extraction(archive_path, e))?;
        let relative = entry
            .path()
            .map_err(|e| UpdateError::extraction(archive_path, e))?
            .into_owned();
        if !is_safe_relative(&relative) {
            return Err(UpdateError::extraction(
                archive_path,
                format!("refusing unsafe entry path {}", relative.display()),
            ));
        }
        let output = dest.join(&relative);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&output).map_err(|e| write_error(archive_path, &output, e))?;
        } else {
            prepare_destination(&output).map_err(|e| write_error(archive_path, &output, e))?;
            entry.unpack(&output).map_err(|e| write_error(archive_path, &output, e))?;
        }
        written.push(output);
    }
    Ok(written)
}

fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Creates the parent of `output` and removes a previous file there, so a
/// running executable is replaced instead of written into.
fn prepare_destination(output: &Path) -> io::Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    if output.is_file() {
        fs::remove_file(output)?;
    }
    Ok(())
}

fn replace_file(src: &Path, dest: &Path) -> io::Result<()> {
    prepare_destination(dest)?;
    fs::copy(src, dest).map(|_| ())
}

fn write_error(archive: &Path, output: &Path, err: io::Error) -> UpdateError {
    UpdateError::extraction(archive, format!("{}: {err}", output.display()))
}

/// The only entry of `dir` if that entry is a directory, as in GitHub zipballs.
fn single_top_level_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?.filter_map(Result::ok);
    let first = entries.next()?;
    if entries.next().is_some() || !first.file_type().ok()?.is_dir() {
        return None;
    }
    Some(first.path())
}
