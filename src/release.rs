use std::time::Duration;
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use crate::config::Config;
use crate::error::{UpdateError, UpdateResult};

/// One downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Asset {
    /// File name of the asset, e.g. `luau-macos.zip`.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// The latest release as described by the release host.
///
/// Fetched fresh on every run and never persisted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Release tag, compared verbatim against the last installed version.
    #[serde(rename = "tag_name")]
    pub version_tag: String,
    /// Prebuilt assets, in the order the host lists them.
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Source snapshot of the tagged commit, always present.
    #[serde(rename = "zipball_url")]
    pub source_archive_url: String,
}

impl ReleaseMetadata {
    /// Returns the first asset with the given name.
    pub fn find_asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Parses the JSON body of a "latest release" response.
    pub fn from_json(url: &str, body: &str) -> UpdateResult<Self> {
        serde_json::from_str(body).map_err(|e| UpdateError::MalformedMetadata {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// The network side of an update run.
///
/// Each method is exactly one GET. Implementations must not cache.
pub trait ReleaseHost {
    /// Fetches the description of the latest release.
    fn latest_release(&self) -> UpdateResult<ReleaseMetadata>;
    /// Downloads the raw bytes behind `url`.
    fn download(&self, url: &str) -> UpdateResult<Vec<u8>>;
}

/// [`ReleaseHost`] backed by the GitHub REST API.
pub struct GitHubReleaseHost {
    client: Client,
    api_url: String,
}

impl GitHubReleaseHost {
    /// Builds a blocking client with the configured timeout and user agent.
    pub fn new(config: &Config) -> UpdateResult<Self> {
        let client = build_client(&config.user_agent, config.timeout).map_err(|e| {
            UpdateError::Config(format!("could not create HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
        })
    }

    fn get(&self, url: &str) -> UpdateResult<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| network_error(url, e))?;
        response.error_for_status().map_err(|e| network_error(url, e))
    }
}

impl ReleaseHost for GitHubReleaseHost {
    fn latest_release(&self) -> UpdateResult<ReleaseMetadata> {
        info!("Checking {} for the latest release", self.api_url);
        let body = self
            .get(&self.api_url)?
            .text()
            .map_err(|e| network_error(&self.api_url, e))?;
        let metadata = ReleaseMetadata::from_json(&self.api_url, &body)?;
        debug!(
            "Latest release {} lists {} assets",
            metadata.version_tag,
            metadata.assets.len()
        );
        Ok(metadata)
    }

    fn download(&self, url: &str) -> UpdateResult<Vec<u8>> {
        info!("Downloading {}", url);
        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|e| network_error(url, e))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .default_headers({
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::ACCEPT,
                reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
            );
            headers
        })
        .build()
}

fn network_error(url: &str, err: reqwest::Error) -> UpdateError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if let Some(status) = err.status() {
        format!("server answered {status}")
    } else {
        err.to_string()
    };
    UpdateError::Network {
        url: url.to_string(),
        message,
        source: Some(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "tag_name": "0.600",
        "name": "0.600",
        "zipball_url": "https://api.github.com/repos/Roblox/luau/zipball/0.600",
        "assets": [
            {"name": "luau-macos.zip", "browser_download_url": "https://example.com/luau-macos.zip", "size": 10},
            {"name": "luau-windows.zip", "browser_download_url": "https://example.com/luau-windows.zip"}
        ]
    }"#;

    #[test]
    fn test_parse_release_payload() {
        let metadata = ReleaseMetadata::from_json("test", PAYLOAD).unwrap();
        assert_eq!(metadata.version_tag, "0.600");
        assert_eq!(metadata.assets.len(), 2);
        assert_eq!(
            metadata.source_archive_url,
            "https://api.github.com/repos/Roblox/luau/zipball/0.600"
        );
    }

    #[test]
    fn test_find_asset_returns_first_match() {
        let mut metadata = ReleaseMetadata::from_json("test", PAYLOAD).unwrap();
        metadata.assets.push(Asset {
            name: "luau-macos.zip".into(),
            download_url: "https://example.com/duplicate.zip".into(),
        });
        let asset = metadata.find_asset("luau-macos.zip").unwrap();
        assert_eq!(asset.download_url, "https://example.com/luau-macos.zip");
        assert!(metadata.find_asset("luau-ubuntu.zip").is_none());
    }

    #[test]
    fn test_missing_assets_defaults_to_empty() {
        let body = r#"{"tag_name": "0.1", "zipball_url": "https://example.com/src.zip"}"#;
        let metadata = ReleaseMetadata::from_json("test", body).unwrap();
        assert!(metadata.assets.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_distinct_error() {
        let err = ReleaseMetadata::from_json("https://api", r#"{"message": "Not Found"}"#).unwrap_err();
        assert!(matches!(err, UpdateError::MalformedMetadata { .. }));
        assert_eq!(err.exit_code(), 9);
    }
}
