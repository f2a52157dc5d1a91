use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::fs_utils::{remove_file_if_exists, remove_path_if_exists};
use crate::marker::{clear_marker, read_marker};
use crate::process::ProcessLauncher;
use crate::{InstallLayout, StateCarrier, SwapExecutor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverOutcome {
    NothingToRecover,
    /// The recorded swap was re-run to completion for this version.
    Resumed(String),
    /// Nothing staged survived; the stale marker and leftovers were removed.
    Cleared,
}

/// Finishes or discards an interrupted swap. Re-running the swap is safe because the
/// copy step overwrites and an existing state backup is adopted as-is.
pub fn recover_interrupted_swap(
    layout: &InstallLayout,
    launcher: &dyn ProcessLauncher,
) -> Result<RecoverOutcome> {
    let Some(contents) = read_marker(layout)? else {
        return Ok(RecoverOutcome::NothingToRecover);
    };

    if let Some(mut plan) = contents.plan {
        if plan.staged_root.is_dir() {
            info!(version = %plan.version, staged_root = %plan.staged_root.display(), "resuming interrupted swap");
            // The recorded parent is long gone; do not wait on a recycled pid.
            plan.parent_pid = std::process::id();
            plan.parent_exit_timeout_secs = 0;
            plan.settle_delay_ms = 0;
            let version = plan.version.clone();
            SwapExecutor::new(plan, launcher)
                .run()
                .map_err(|err| anyhow!("recovery swap failed: {err}"))?;
            return Ok(RecoverOutcome::Resumed(version));
        }
        warn!(staged_root = %plan.staged_root.display(), "staged release is gone; clearing marker");
    } else {
        warn!("update marker has no readable plan; clearing marker");
    }

    if layout.state_backup_path().is_file() {
        let carrier = StateCarrier::from_names(layout.names());
        let handle = carrier.preserve(layout.install_dir())?;
        carrier.restore(layout.install_dir(), handle)?;
        info!(path = %layout.state_path().display(), "local state put back from backup");
    }

    remove_path_if_exists(&layout.staging_dir())?;
    remove_file_if_exists(&layout.swap_script_path())?;
    clear_marker(layout)?;
    Ok(RecoverOutcome::Cleared)
}
