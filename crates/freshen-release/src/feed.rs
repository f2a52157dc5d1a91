use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use freshen_core::{normalize_version, ArchiveType, ReleaseDescriptor};
use semver::Version;
use serde::Deserialize;

use crate::{ReleaseError, ReleaseSource};

#[derive(Debug, Deserialize)]
struct ReleaseFeed {
    #[serde(default)]
    releases: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    version: String,
    archive_url: String,
    archive_type: Option<ArchiveType>,
    sha256: Option<String>,
    size: Option<u64>,
}

/// Release feed kept in a local JSON file. Relative archive paths resolve against the
/// feed's own directory.
#[derive(Debug, Clone)]
pub struct FeedReleaseSource {
    path: PathBuf,
}

impl FeedReleaseSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve_locator(&self, raw: &str) -> String {
        if raw.contains("://") || Path::new(raw).is_absolute() {
            return raw.to_string();
        }
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        base.join(raw).display().to_string()
    }
}

impl ReleaseSource for FeedReleaseSource {
    fn latest(&self) -> Result<ReleaseDescriptor, ReleaseError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ReleaseError::Transport {
                    source_name: self.source_name(),
                    message: "release feed does not exist".to_string(),
                });
            }
            Err(err) => {
                return Err(ReleaseError::Transport {
                    source_name: self.source_name(),
                    message: err.to_string(),
                });
            }
        };

        let feed: ReleaseFeed =
            serde_json::from_str(&raw).map_err(|err| ReleaseError::Parse {
                source_name: self.source_name(),
                message: err.to_string(),
            })?;

        let mut releases = feed.releases;
        releases.sort_by(|a, b| feed_version_order(&b.version, &a.version));
        let entry = releases
            .into_iter()
            .next()
            .ok_or_else(|| ReleaseError::NotFound {
                source_name: self.source_name(),
            })?;

        let archive_type = entry
            .archive_type
            .or_else(|| ArchiveType::infer_from_url(&entry.archive_url))
            .ok_or_else(|| ReleaseError::Parse {
                source_name: self.source_name(),
                message: format!(
                    "cannot infer archive type for '{}'; set archive_type",
                    entry.archive_url
                ),
            })?;

        let mut descriptor = ReleaseDescriptor::new(
            entry.version,
            self.resolve_locator(&entry.archive_url),
            archive_type,
        );
        descriptor.expected_size = entry.size;
        descriptor.sha256 = entry.sha256;
        Ok(descriptor)
    }
}

/// Total order over feed versions: semver ranks above anything unparseable, and
/// unparseable versions fall back to plain string order among themselves.
fn feed_version_order(a: &str, b: &str) -> Ordering {
    match (
        Version::parse(normalize_version(a)),
        Version::parse(normalize_version(b)),
    ) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
