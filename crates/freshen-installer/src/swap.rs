use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use crate::fs_utils::{copy_dir_overwrite, remove_file_if_exists, remove_path_if_exists};
use crate::installed::write_installed_version;
use crate::marker::{append_checkpoint, clear_marker, read_marker, SwapPlan};
use crate::process::{wait_for_process_exit, ProcessLauncher};
use crate::{InstallLayout, StateCarrier, SwapError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapState {
    Pending,
    BackedUp,
    Purged,
    Copied,
    Restored,
    Relaunched,
    CleanedUp,
    Failed(String),
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::BackedUp => "backed_up",
            Self::Purged => "purged",
            Self::Copied => "copied",
            Self::Restored => "restored",
            Self::Relaunched => "relaunched",
            Self::CleanedUp => "cleaned_up",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CleanedUp | Self::Failed(_))
    }
}

/// Replaces the installation directory with a staged release while preserving local
/// state.
///
/// Purge, copy and restore are not transactional. A crash between them leaves the
/// directory incomplete with the marker still present; running the executor again over
/// the same staged root finishes the job, since the copy overwrites and the state backup
/// is adopted.
pub struct SwapExecutor<'a> {
    layout: InstallLayout,
    plan: SwapPlan,
    carrier: StateCarrier,
    launcher: &'a dyn ProcessLauncher,
    state: SwapState,
}

impl<'a> SwapExecutor<'a> {
    pub fn new(plan: SwapPlan, launcher: &'a dyn ProcessLauncher) -> Self {
        let layout = InstallLayout::new(plan.install_dir.clone(), plan.names.clone());
        let carrier = StateCarrier::from_names(&plan.names);
        Self {
            layout,
            plan,
            carrier,
            launcher,
            state: SwapState::Pending,
        }
    }

    /// Loads the plan the orchestrator recorded in the marker and checks it matches the
    /// directories this process was started for.
    pub fn from_marker(
        layout: &InstallLayout,
        staged_root: &Path,
        launcher: &'a dyn ProcessLauncher,
    ) -> Result<Self, SwapError> {
        let plan = read_marker(layout)
            .map_err(SwapError::Plan)?
            .ok_or_else(|| {
                SwapError::Plan(anyhow!(
                    "no update marker at {}",
                    layout.marker_path().display()
                ))
            })?
            .plan
            .ok_or_else(|| SwapError::Plan(anyhow!("update marker carries no swap plan")))?;

        if plan.staged_root != staged_root {
            return Err(SwapError::Plan(anyhow!(
                "staged root {} does not match the recorded plan ({})",
                staged_root.display(),
                plan.staged_root.display()
            )));
        }
        Ok(Self::new(plan, launcher))
    }

    pub fn state(&self) -> &SwapState {
        &self.state
    }

    pub fn plan(&self) -> &SwapPlan {
        &self.plan
    }

    /// Runs every transition to `CleanedUp`. On failure the marker keeps a `failed`
    /// checkpoint and stays in place.
    pub fn run(mut self) -> Result<SwapState, SwapError> {
        self.wait_for_parent();
        info!(
            version = %self.plan.version,
            install_dir = %self.layout.install_dir().display(),
            "starting swap"
        );

        let handle = self.step(SwapState::BackedUp, |executor| {
            executor
                .carrier
                .preserve(executor.layout.install_dir())
        })?;

        self.step(SwapState::Purged, |executor| {
            let removed = purge_install_dir(
                executor.layout.install_dir(),
                &executor.layout.purge_exclusions(),
            )?;
            info!(removed, "installation directory purged");
            Ok(())
        })?;

        self.step(SwapState::Copied, |executor| {
            copy_staged_tree(&executor.plan.staged_root, executor.layout.install_dir())
        })?;

        self.step(SwapState::Restored, |executor| {
            executor
                .carrier
                .restore(executor.layout.install_dir(), handle)?;
            write_installed_version(&executor.layout, &executor.plan.version)
        })?;

        match self
            .launcher
            .spawn_detached(&self.plan.relaunch, self.layout.install_dir())
        {
            Ok(pid) => {
                info!(pid, command = %self.plan.relaunch, "application relaunched");
                self.advance(SwapState::Relaunched);
            }
            Err(err) => {
                self.fail(&format!("{err:#}"));
                return Err(SwapError::Spawn(err));
            }
        }

        self.cleanup().map_err(|cause| {
            self.fail(&format!("{cause:#}"));
            SwapError::Filesystem {
                state: SwapState::Relaunched.as_str(),
                cause,
            }
        })?;
        self.state = SwapState::CleanedUp;
        info!(version = %self.plan.version, "swap complete");
        Ok(self.state)
    }

    fn wait_for_parent(&self) {
        if self.plan.parent_pid == std::process::id() {
            return;
        }
        let timeout = Duration::from_secs(self.plan.parent_exit_timeout_secs);
        if wait_for_process_exit(self.plan.parent_pid, timeout) {
            info!(parent_pid = self.plan.parent_pid, "parent process has exited");
        } else {
            warn!(
                parent_pid = self.plan.parent_pid,
                timeout_secs = self.plan.parent_exit_timeout_secs,
                "parent process still running; continuing after settle delay"
            );
        }
        thread::sleep(Duration::from_millis(self.plan.settle_delay_ms));
    }

    fn step<T>(
        &mut self,
        next: SwapState,
        action: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<T, SwapError> {
        match action(self) {
            Ok(value) => {
                self.advance(next);
                Ok(value)
            }
            Err(cause) => {
                let reached = self.state.as_str();
                self.fail(&format!("{cause:#}"));
                Err(SwapError::Filesystem {
                    state: reached,
                    cause,
                })
            }
        }
    }

    fn advance(&mut self, next: SwapState) {
        if let Err(err) = append_checkpoint(&self.layout, next.as_str(), None) {
            warn!(state = next.as_str(), error = %format!("{err:#}"), "failed to record checkpoint");
        }
        self.state = next;
    }

    fn fail(&mut self, reason: &str) {
        error!(state = self.state.as_str(), reason, "swap failed");
        if let Err(err) = append_checkpoint(&self.layout, "failed", Some(reason.to_string())) {
            warn!(error = %format!("{err:#}"), "failed to record failure checkpoint");
        }
        self.state = SwapState::Failed(reason.to_string());
    }

    /// Staging, then the swap executable, then the marker: the marker goes last so a
    /// crash anywhere before still reads as "update in progress".
    fn cleanup(&self) -> Result<()> {
        remove_path_if_exists(&self.layout.staging_dir())?;

        let script = self.layout.swap_script_path();
        if let Err(err) = remove_file_if_exists(&script) {
            // Windows refuses to delete a running image.
            warn!(path = %script.display(), error = %err, "could not remove swap executable");
        }

        clear_marker(&self.layout)
    }
}

/// Deletes every entry of `install_dir` whose name is not in `keep`. Returns the number
/// of entries removed.
pub fn purge_install_dir(install_dir: &Path, keep: &[OsString]) -> Result<usize> {
    let keep: BTreeSet<&OsString> = keep.iter().collect();
    let mut removed = 0;
    for entry in fs::read_dir(install_dir)
        .with_context(|| format!("failed to read {}", install_dir.display()))?
    {
        let entry = entry?;
        if keep.contains(&entry.file_name()) {
            continue;
        }
        remove_path_if_exists(&entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

/// Plain overwrite copy of the staged release into the installation directory.
pub fn copy_staged_tree(staged_root: &Path, install_dir: &Path) -> Result<()> {
    if !staged_root.is_dir() {
        return Err(anyhow!(
            "staged root is not a directory: {}",
            staged_root.display()
        ));
    }
    copy_dir_overwrite(staged_root, install_dir)
}
