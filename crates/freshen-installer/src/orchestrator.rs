use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use freshen_core::{compare_versions, CommandSpec, LauncherConfig, VersionRelation};
use freshen_release::ReleaseSource;
use tracing::{error, info, warn};

use crate::fs_utils::{current_unix_timestamp, remove_file_if_exists, remove_path_if_exists};
use crate::installed::read_installed_version;
use crate::marker::{claim_marker, clear_marker, marker_exists, SwapPlan};
use crate::process::ProcessLauncher;
use crate::stager::{ArchiveStager, DownloadProgress};
use crate::{InstallLayout, UpdateError};

#[derive(Debug)]
pub enum UpdateOutcome {
    UpToDate(String),
    /// A swap process was spawned; the caller must exit so the swap can proceed.
    UpdateLaunched(String),
    CheckFailed(UpdateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTiming {
    pub parent_exit_timeout: Duration,
    pub settle_delay: Duration,
    pub connect_timeout: Duration,
}

impl SwapTiming {
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            parent_exit_timeout: Duration::from_secs(config.update.parent_exit_timeout_secs),
            settle_delay: Duration::from_millis(config.update.settle_delay_ms),
            connect_timeout: Duration::from_secs(config.release.timeout_secs),
        }
    }
}

/// Checks for a newer release and, when one exists, stages it and hands the swap off to
/// a detached copy of `swap_program`.
pub struct UpdateOrchestrator<'a, S> {
    layout: InstallLayout,
    source: S,
    launcher: &'a dyn ProcessLauncher,
    swap_program: PathBuf,
    relaunch: CommandSpec,
    timing: SwapTiming,
    progress: Option<&'a dyn DownloadProgress>,
}

impl<'a, S: ReleaseSource> UpdateOrchestrator<'a, S> {
    pub fn new(
        layout: InstallLayout,
        source: S,
        launcher: &'a dyn ProcessLauncher,
        swap_program: impl Into<PathBuf>,
        relaunch: CommandSpec,
        timing: SwapTiming,
    ) -> Self {
        Self {
            layout,
            source,
            launcher,
            swap_program: swap_program.into(),
            relaunch,
            timing,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn DownloadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Never fails: every error degrades to `CheckFailed`, leaving the current version
    /// in place.
    pub fn run(&self) -> UpdateOutcome {
        match self.try_run() {
            Ok(outcome) => outcome,
            Err(UpdateError::MissingVersionFile { path }) => {
                warn!(path = %path.display(), "installed version file missing; skipping update check");
                UpdateOutcome::CheckFailed(UpdateError::MissingVersionFile { path })
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "update check failed");
                UpdateOutcome::CheckFailed(err)
            }
        }
    }

    fn try_run(&self) -> Result<UpdateOutcome, UpdateError> {
        let installed = read_installed_version(&self.layout)?;
        let latest = self.source.latest()?;

        match compare_versions(&installed, &latest.version) {
            VersionRelation::Same => {
                info!(version = %installed, "application is up to date");
                return Ok(UpdateOutcome::UpToDate(installed));
            }
            VersionRelation::Older => {
                warn!(installed = %installed, latest = %latest.version, "published release is older than installed; replacing");
            }
            VersionRelation::Newer | VersionRelation::Different => {
                info!(installed = %installed, latest = %latest.version, "new version found");
            }
        }

        if marker_exists(&self.layout) {
            return Err(UpdateError::UpdateInProgress {
                marker: self.layout.marker_path(),
            });
        }

        let staging = self.layout.staging_dir();
        remove_path_if_exists(&staging).map_err(UpdateError::Filesystem)?;
        self.layout
            .ensure_staging_dir()
            .map_err(UpdateError::Filesystem)?;

        match self.stage_and_hand_off(&latest, &staging) {
            Ok(()) => Ok(UpdateOutcome::UpdateLaunched(latest.version)),
            Err(err) => {
                if let Err(cleanup) = remove_path_if_exists(&staging) {
                    warn!(error = %format!("{cleanup:#}"), "failed to remove staging directory");
                }
                Err(err)
            }
        }
    }

    fn stage_and_hand_off(
        &self,
        latest: &freshen_core::ReleaseDescriptor,
        staging: &Path,
    ) -> Result<(), UpdateError> {
        let mut stager = ArchiveStager::new(self.timing.connect_timeout);
        if let Some(progress) = self.progress {
            stager = stager.with_progress(progress);
        }
        let staged_root = stager.stage(latest, staging)?;

        let script = self.install_swap_script().map_err(UpdateError::Filesystem)?;
        let plan = SwapPlan {
            version: latest.version.clone(),
            install_dir: self.layout.install_dir().to_path_buf(),
            staged_root: staged_root.clone(),
            names: self.layout.names().clone(),
            relaunch: self.relaunch.clone(),
            parent_pid: std::process::id(),
            parent_exit_timeout_secs: self.timing.parent_exit_timeout.as_secs(),
            settle_delay_ms: self.timing.settle_delay.as_millis() as u64,
            started_at_unix: current_unix_timestamp().map_err(UpdateError::Filesystem)?,
        };

        if let Err(err) = claim_marker(&self.layout, &plan) {
            self.discard_swap_script(&script);
            return Err(UpdateError::Filesystem(err));
        }

        let command = swap_command(&script, &plan, &self.layout.names().marker_file);
        match self
            .launcher
            .spawn_detached(&command, self.layout.install_dir())
        {
            Ok(pid) => {
                info!(pid, version = %plan.version, "swap process launched");
                Ok(())
            }
            Err(err) => {
                // The marker must only exist while a swap process does.
                if let Err(cleanup) = clear_marker(&self.layout) {
                    warn!(error = %format!("{cleanup:#}"), "failed to clear update marker after spawn failure");
                }
                self.discard_swap_script(&script);
                Err(UpdateError::Spawn(err))
            }
        }
    }

    fn discard_swap_script(&self, script: &Path) {
        if let Err(cleanup) = remove_file_if_exists(script) {
            warn!(path = %script.display(), error = %format!("{cleanup:#}"), "failed to remove swap executable");
        }
    }

    fn install_swap_script(&self) -> anyhow::Result<PathBuf> {
        let script = self.layout.swap_script_path();
        fs::copy(&self.swap_program, &script).with_context(|| {
            format!(
                "failed to install swap executable from {} to {}",
                self.swap_program.display(),
                script.display()
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut permissions = fs::metadata(&script)
                .with_context(|| format!("failed to stat {}", script.display()))?
                .permissions();
            permissions.set_mode(0o755);
            fs::set_permissions(&script, permissions).with_context(|| {
                format!("failed to set executable mode on {}", script.display())
            })?;
        }

        Ok(script)
    }
}

pub(crate) fn swap_command(script: &Path, plan: &SwapPlan, marker_file: &str) -> CommandSpec {
    CommandSpec::new(
        script.display().to_string(),
        [
            "swap".to_string(),
            "--install-dir".to_string(),
            plan.install_dir.display().to_string(),
            "--staged-root".to_string(),
            plan.staged_root.display().to_string(),
            "--parent-pid".to_string(),
            plan.parent_pid.to_string(),
            "--marker".to_string(),
            marker_file.to_string(),
        ],
    )
}
