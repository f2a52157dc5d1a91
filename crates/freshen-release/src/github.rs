use std::time::Duration;

use freshen_core::{ArchiveType, ReleaseDescriptor};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::{ReleaseError, ReleaseSource};

const SOURCE_NAME: &str = "github";

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: Option<String>,
    tarball_url: Option<String>,
    zipball_url: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    size: Option<u64>,
}

/// Latest-release lookup against the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleaseSource {
    client: Client,
    url: String,
    asset: Option<String>,
}

impl GitHubReleaseSource {
    pub fn new(
        api_base: &str,
        owner: &str,
        repo: &str,
        asset: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ReleaseError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self {
            client,
            url: format!(
                "{}/repos/{owner}/{repo}/releases/latest",
                api_base.trim_end_matches('/')
            ),
            asset,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReleaseSource for GitHubReleaseSource {
    fn latest(&self) -> Result<ReleaseDescriptor, ReleaseError> {
        debug!(url = %self.url, "querying latest release");
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, concat!("freshen/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .map_err(|err| ReleaseError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ReleaseError::NotFound {
                source_name: self.url.clone(),
            });
        }
        if !status.is_success() {
            return Err(ReleaseError::Transport {
                source_name: SOURCE_NAME.to_string(),
                message: format!("unexpected status {status}"),
            });
        }

        let body = response.text().map_err(|err| ReleaseError::Transport {
            source_name: SOURCE_NAME.to_string(),
            message: format!("failed to read response body: {err}"),
        })?;
        parse_github_release(&body, self.asset.as_deref())
    }
}

/// Maps a `releases/latest` payload onto a descriptor. With `asset` set, the named release
/// asset is used; otherwise the source tarball, then the source zipball.
pub fn parse_github_release(
    body: &str,
    asset: Option<&str>,
) -> Result<ReleaseDescriptor, ReleaseError> {
    let parse_error = |message: String| ReleaseError::Parse {
        source_name: SOURCE_NAME.to_string(),
        message,
    };

    let release: GitHubRelease =
        serde_json::from_str(body).map_err(|err| parse_error(err.to_string()))?;
    let version = release
        .tag_name
        .filter(|tag| !tag.trim().is_empty())
        .ok_or_else(|| parse_error("missing tag_name".to_string()))?;

    if let Some(asset_name) = asset {
        let asset = release
            .assets
            .into_iter()
            .find(|candidate| candidate.name == asset_name)
            .ok_or_else(|| parse_error(format!("release has no asset named '{asset_name}'")))?;
        let archive_type = ArchiveType::infer_from_url(&asset.name).ok_or_else(|| {
            parse_error(format!("cannot infer archive type of asset '{}'", asset.name))
        })?;
        let mut descriptor =
            ReleaseDescriptor::new(version, asset.browser_download_url, archive_type);
        descriptor.expected_size = asset.size;
        return Ok(descriptor);
    }

    if let Some(url) = release.tarball_url.filter(|url| !url.is_empty()) {
        return Ok(ReleaseDescriptor::new(version, url, ArchiveType::TarGz));
    }
    if let Some(url) = release.zipball_url.filter(|url| !url.is_empty()) {
        return Ok(ReleaseDescriptor::new(version, url, ArchiveType::Zip));
    }
    Err(parse_error("release has no archive url".to_string()))
}
