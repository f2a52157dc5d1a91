use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::fs_utils::remove_file_if_exists;
use crate::InstallNames;

/// Proof that local state was copied aside; consumed by [`StateCarrier::restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    backup_path: PathBuf,
}

impl BackupHandle {
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }
}

/// Carries the single local-state file across a full replacement of the installation
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCarrier {
    state_file: String,
    backup_file: String,
}

impl StateCarrier {
    pub fn new(state_file: impl Into<String>, backup_file: impl Into<String>) -> Self {
        Self {
            state_file: state_file.into(),
            backup_file: backup_file.into(),
        }
    }

    pub fn from_names(names: &InstallNames) -> Self {
        Self::new(&names.state_file, &names.state_backup)
    }

    pub fn backup_file(&self) -> &str {
        &self.backup_file
    }

    /// Copies the state file to its backup name. The copy lands on a temp name first
    /// and is renamed, so the backup path only ever holds complete content.
    ///
    /// A backup left by an interrupted earlier swap always wins: by the time it exists the
    /// state file may already be the copy a new release shipped.
    pub fn preserve(&self, install_dir: &Path) -> Result<Option<BackupHandle>> {
        let state_path = install_dir.join(&self.state_file);
        let backup_path = install_dir.join(&self.backup_file);

        if backup_path.is_file() {
            info!(backup = %backup_path.display(), "adopting existing local state backup");
            return Ok(Some(BackupHandle { backup_path }));
        }

        if !state_path.is_file() {
            debug!(path = %state_path.display(), "no local state to preserve");
            return Ok(None);
        }

        let tmp_path = install_dir.join(format!("{}.tmp", self.backup_file));
        fs::copy(&state_path, &tmp_path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                state_path.display(),
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, &backup_path).with_context(|| {
            format!(
                "failed to move {} to {}",
                tmp_path.display(),
                backup_path.display()
            )
        })?;
        Ok(Some(BackupHandle { backup_path }))
    }

    /// Moves the backup over the canonical path. Without a handle the state file the new
    /// release shipped, if any, is left untouched.
    pub fn restore(&self, install_dir: &Path, handle: Option<BackupHandle>) -> Result<()> {
        let Some(handle) = handle else {
            return Ok(());
        };

        let state_path = install_dir.join(&self.state_file);
        fs::rename(&handle.backup_path, &state_path).with_context(|| {
            format!(
                "failed to restore {} from {}",
                state_path.display(),
                handle.backup_path.display()
            )
        })?;
        remove_file_if_exists(&handle.backup_path).with_context(|| {
            format!("failed to remove {}", handle.backup_path.display())
        })?;
        Ok(())
    }
}
