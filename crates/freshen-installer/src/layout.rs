use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use freshen_core::{LauncherConfig, CONFIG_FILE_NAME};
use serde::{Deserialize, Serialize};

/// File names inside the installation directory that the updater owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallNames {
    pub version_file: String,
    pub marker_file: String,
    pub staging_dir: String,
    pub swap_script: String,
    pub state_file: String,
    pub state_backup: String,
}

impl InstallNames {
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            version_file: config.update.version_file.clone(),
            marker_file: config.update.marker_file.clone(),
            staging_dir: config.update.staging_dir.clone(),
            swap_script: format!("{}{}", config.update.swap_script, std::env::consts::EXE_SUFFIX),
            state_file: config.state.file.clone(),
            state_backup: config.state.backup_file(),
        }
    }
}

impl Default for InstallNames {
    fn default() -> Self {
        Self::from_config(&LauncherConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    install_dir: PathBuf,
    names: InstallNames,
}

impl InstallLayout {
    pub fn new(install_dir: impl Into<PathBuf>, names: InstallNames) -> Self {
        Self {
            install_dir: install_dir.into(),
            names,
        }
    }

    pub fn from_config(install_dir: impl Into<PathBuf>, config: &LauncherConfig) -> Self {
        Self::new(install_dir, InstallNames::from_config(config))
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn names(&self) -> &InstallNames {
        &self.names
    }

    pub fn config_path(&self) -> PathBuf {
        self.install_dir.join(CONFIG_FILE_NAME)
    }

    pub fn version_path(&self) -> PathBuf {
        self.install_dir.join(&self.names.version_file)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.install_dir.join(&self.names.marker_file)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.install_dir.join(&self.names.staging_dir)
    }

    pub fn swap_script_path(&self) -> PathBuf {
        self.install_dir.join(&self.names.swap_script)
    }

    pub fn state_path(&self) -> PathBuf {
        self.install_dir.join(&self.names.state_file)
    }

    pub fn state_backup_path(&self) -> PathBuf {
        self.install_dir.join(&self.names.state_backup)
    }

    /// Entries the purge step must leave alone: the running swap executable, the staged
    /// release, the local-state backup, the in-progress marker and the launcher config.
    /// A release that ships its own config still overwrites it during the copy step.
    pub fn purge_exclusions(&self) -> Vec<OsString> {
        [
            self.names.swap_script.as_str(),
            self.names.staging_dir.as_str(),
            self.names.state_backup.as_str(),
            self.names.marker_file.as_str(),
            CONFIG_FILE_NAME,
        ]
        .into_iter()
        .map(OsString::from)
        .collect()
    }

    /// Logs live next to the installation so the purge step never removes them.
    pub fn default_log_dir(&self) -> PathBuf {
        self.install_dir
            .parent()
            .map(|parent| parent.join(".freshen-logs"))
            .unwrap_or_else(|| std::env::temp_dir().join("freshen-logs"))
    }

    pub fn ensure_staging_dir(&self) -> Result<PathBuf> {
        let dir = self.staging_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }
}
