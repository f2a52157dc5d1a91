mod error;
mod extract;
mod fs_utils;
mod installed;
mod layout;
mod marker;
mod orchestrator;
mod process;
mod recover;
mod requirements;
mod stager;
mod state_carrier;
mod swap;

pub use error::{StageError, SwapError, UpdateError};
pub use extract::normalize_staged_root;
pub use fs_utils::{copy_dir_overwrite, current_unix_timestamp, remove_path_if_exists};
pub use installed::{read_installed_version, write_installed_version};
pub use layout::{InstallLayout, InstallNames};
pub use marker::{
    append_checkpoint, claim_marker, clear_marker, marker_age_secs, marker_exists, read_marker,
    MarkerContents, SwapCheckpoint, SwapPlan,
};
pub use orchestrator::{SwapTiming, UpdateOrchestrator, UpdateOutcome};
pub use process::{
    process_is_running, wait_for_process_exit, ProcessLauncher, SystemProcessLauncher,
};
pub use recover::{recover_interrupted_swap, RecoverOutcome};
pub use requirements::{ensure_requirements, RequirementReport, RequirementStatus};
pub use stager::{ArchiveStager, DownloadProgress};
pub use state_carrier::{BackupHandle, StateCarrier};
pub use swap::{copy_staged_tree, purge_install_dir, SwapExecutor, SwapState};
