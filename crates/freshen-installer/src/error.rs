use std::path::PathBuf;

use freshen_release::ReleaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to download {locator}: {message}")]
    Download { locator: String, message: String },
    #[error("failed to extract archive: {message}")]
    Extract { message: String },
    #[error("{0:#}")]
    Filesystem(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("installed version file is missing: {}", path.display())]
    MissingVersionFile { path: PathBuf },
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("an update is already in progress: {}", marker.display())]
    UpdateInProgress { marker: PathBuf },
    #[error("{0:#}")]
    Filesystem(anyhow::Error),
    #[error("failed to spawn swap process: {0:#}")]
    Spawn(anyhow::Error),
}

impl UpdateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingVersionFile { .. } => "missing-version-file",
            Self::Release(err) => err.kind(),
            Self::Stage(StageError::Download { .. }) => "download",
            Self::Stage(StageError::Extract { .. }) => "extract",
            Self::Stage(StageError::Filesystem(_)) | Self::Filesystem(_) => "filesystem",
            Self::UpdateInProgress { .. } => "update-in-progress",
            Self::Spawn(_) => "spawn",
        }
    }
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("swap plan unavailable: {0:#}")]
    Plan(anyhow::Error),
    #[error("swap failed after reaching {state}: {cause:#}")]
    Filesystem {
        state: &'static str,
        cause: anyhow::Error,
    },
    #[error("failed to relaunch application: {0:#}")]
    Spawn(anyhow::Error),
}
