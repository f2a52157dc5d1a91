use std::path::Path;

use freshen_core::{LauncherConfig, ReleaseDescriptor, ReleaseSourceKind};

mod error;
mod feed;
mod github;

pub use error::ReleaseError;
pub use feed::FeedReleaseSource;
pub use github::{parse_github_release, GitHubReleaseSource};

/// Answers "what is the latest published release". Implementations must not have side
/// effects, so a failed query can simply be retried.
pub trait ReleaseSource {
    fn latest(&self) -> Result<ReleaseDescriptor, ReleaseError>;
}

impl<T: ReleaseSource + ?Sized> ReleaseSource for Box<T> {
    fn latest(&self) -> Result<ReleaseDescriptor, ReleaseError> {
        (**self).latest()
    }
}

impl<T: ReleaseSource + ?Sized> ReleaseSource for &T {
    fn latest(&self) -> Result<ReleaseDescriptor, ReleaseError> {
        (**self).latest()
    }
}

/// Builds the source named by `[release]`. Relative feed paths resolve against the
/// installation directory.
pub fn source_from_config(
    config: &LauncherConfig,
    install_dir: &Path,
) -> Result<Box<dyn ReleaseSource>, ReleaseError> {
    let release = &config.release;
    match release.kind {
        ReleaseSourceKind::Github => Ok(Box::new(GitHubReleaseSource::new(
            &release.api_base,
            &release.owner,
            &release.repo,
            release.asset.clone(),
            std::time::Duration::from_secs(release.timeout_secs),
        )?)),
        ReleaseSourceKind::Feed => {
            let feed = release.feed.as_ref().ok_or_else(|| ReleaseError::Parse {
                source_name: "feed".to_string(),
                message: "release.feed is not configured".to_string(),
            })?;
            Ok(Box::new(FeedReleaseSource::new(install_dir.join(feed))))
        }
    }
}
