use std::path::{Path, PathBuf};
use log::{debug, info};
use crate::cache::CacheStore;
use crate::error::UpdateResult;
use crate::installer::InstallStrategy;
use crate::release::{ReleaseHost, ReleaseMetadata};

/// Cache file name used for the source snapshot of a release.
pub const SOURCE_ARCHIVE_FILE_NAME: &str = "luau-source.zip";

/// Where the artifact for a plan comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Already present at the canonical cache path.
    Cached,
    /// Must be fetched with a single GET.
    Download { url: String },
}

/// Everything needed to obtain and install one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub version: String,
    /// Name the artifact is cached under.
    pub file_name: String,
    /// Canonical cache path of the artifact.
    pub artifact_path: PathBuf,
    pub source: ArtifactSource,
    pub strategy: InstallStrategy,
}

impl FetchPlan {
    /// True when the artifact is a source snapshot that has to be built.
    pub fn is_source_archive(&self) -> bool {
        matches!(self.strategy, InstallStrategy::SourceBuild)
    }

    pub fn needs_download(&self) -> bool {
        matches!(self.source, ArtifactSource::Download { .. })
    }
}

/// Outcome of comparing the latest release with the installed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The latest release is already installed.
    Skip { version: String },
    Fetch(FetchPlan),
}

/// Decides whether and what to fetch.
///
/// `asset_name` is the platform's prebuilt asset name as returned by
/// [`crate::platform::resolve_asset_identifier`]. This function performs no
/// network access; it only looks at the cache to tell a hit from a miss.
pub fn decide(
    metadata: &ReleaseMetadata,
    last_installed: Option<&str>,
    asset_name: Option<&str>,
    cache: &CacheStore,
    force: bool,
) -> Decision {
    let version = metadata.version_tag.as_str();
    if !force && last_installed == Some(version) {
        debug!("Installed version {} is the latest", version);
        return Decision::Skip {
            version: version.to_string(),
        };
    }

    let (file_name, url, strategy) = match asset_name.and_then(|name| metadata.find_asset(name)) {
        Some(asset) => (
            asset.name.clone(),
            asset.download_url.clone(),
            InstallStrategy::BinaryBundle,
        ),
        None => {
            info!(
                "No prebuilt asset for this platform in {}, falling back to the source archive",
                version
            );
            (
                SOURCE_ARCHIVE_FILE_NAME.to_string(),
                metadata.source_archive_url.clone(),
                InstallStrategy::SourceBuild,
            )
        }
    };

    let artifact_path = cache.artifact_path(version, &file_name);
    let source = if cache.has_artifact(version, &file_name) && cache.verify_artifact(version, &file_name) {
        debug!("Cache hit for {}", artifact_path.display());
        ArtifactSource::Cached
    } else {
        ArtifactSource::Download { url }
    };

    Decision::Fetch(FetchPlan {
        version: version.to_string(),
        file_name,
        artifact_path,
        source,
        strategy,
    })
}

/// Makes the artifact of `plan` available locally and returns its path.
///
/// A cached plan touches neither the network nor the cache. A download plan
/// issues exactly one GET and stores the body verbatim; if the GET fails the
/// cache is left as it was.
pub fn acquire(plan: &FetchPlan, host: &dyn ReleaseHost, cache: &CacheStore) -> UpdateResult<PathBuf> {
    match &plan.source {
        ArtifactSource::Cached => {
            info!("Using cached {}", plan.artifact_path.display());
            Ok(plan.artifact_path.clone())
        }
        ArtifactSource::Download { url } => {
            let bytes = host.download(url)?;
            let executable = !is_archive_name(&plan.file_name);
            cache.store_artifact(&plan.version, &plan.file_name, &bytes, executable)
        }
    }
}

/// Whether a file name denotes an archive rather than a runnable file.
pub fn is_archive_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    [".zip", ".tar.gz", ".tgz"].iter().any(|ext| lower.ends_with(ext))
}

/// Parent directory of an acquired artifact, the last-resort install target.
pub fn artifact_dir(artifact: &Path) -> PathBuf {
    artifact
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
