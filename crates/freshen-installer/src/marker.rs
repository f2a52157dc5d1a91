use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use freshen_core::CommandSpec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fs_utils::{current_unix_timestamp, remove_file_if_exists};
use crate::{InstallLayout, InstallNames};

/// Everything the detached swap process needs, recorded as the first line of the
/// in-progress marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPlan {
    pub version: String,
    pub install_dir: PathBuf,
    pub staged_root: PathBuf,
    pub names: InstallNames,
    pub relaunch: CommandSpec,
    pub parent_pid: u32,
    pub parent_exit_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub started_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCheckpoint {
    pub seq: u64,
    pub state: String,
    pub at_unix: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerContents {
    pub plan: Option<SwapPlan>,
    pub checkpoints: Vec<SwapCheckpoint>,
}

impl MarkerContents {
    pub fn last_state(&self) -> Option<&str> {
        self.checkpoints.last().map(|checkpoint| checkpoint.state.as_str())
    }
}

pub fn marker_exists(layout: &InstallLayout) -> bool {
    layout.marker_path().exists()
}

/// Creates the marker with create-new semantics so two cycles can never both hold it.
pub fn claim_marker(layout: &InstallLayout, plan: &SwapPlan) -> Result<PathBuf> {
    let path = layout.marker_path();
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(anyhow!(
                "update marker already exists: {}",
                path.display()
            ));
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to claim update marker: {}", path.display()));
        }
    };

    if let Err(err) = write_plan_header(&mut file, plan) {
        drop(file);
        return Err(abandon_claim(&path, err));
    }
    Ok(path)
}

fn write_plan_header(file: &mut fs::File, plan: &SwapPlan) -> Result<()> {
    let header = serde_json::to_string(plan).context("failed to serialize swap plan")?;
    file.write_all(format!("{header}\n").as_bytes())
        .context("failed to write plan header")?;
    file.sync_all().context("failed to flush plan header")
}

/// Deletes a marker whose plan header never made it to disk, so no marker outlives a
/// claim that failed.
pub(crate) fn abandon_claim(path: &Path, err: anyhow::Error) -> anyhow::Error {
    if let Err(cleanup) = remove_file_if_exists(path) {
        warn!(path = %path.display(), error = %format!("{cleanup:#}"), "failed to remove partial update marker");
    }
    err.context(format!("failed to claim update marker: {}", path.display()))
}

pub fn append_checkpoint(
    layout: &InstallLayout,
    state: &str,
    reason: Option<String>,
) -> Result<SwapCheckpoint> {
    let path = layout.marker_path();
    let seq = match read_marker(layout)? {
        Some(contents) => contents.checkpoints.last().map_or(1, |last| last.seq + 1),
        None => return Err(anyhow!("update marker is missing: {}", path.display())),
    };
    let checkpoint = SwapCheckpoint {
        seq,
        state: state.to_string(),
        at_unix: current_unix_timestamp()?,
        reason,
    };

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open update marker: {}", path.display()))?;
    let line = serde_json::to_string(&checkpoint).context("failed to serialize checkpoint")?;
    file.write_all(format!("{line}\n").as_bytes())
        .with_context(|| format!("failed to append update marker: {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush update marker: {}", path.display()))?;
    Ok(checkpoint)
}

/// Reads the marker. Content is advisory: a marker that is empty or unparsable still
/// counts as present, it just carries no plan.
pub fn read_marker(layout: &InstallLayout) -> Result<Option<MarkerContents>> {
    let path = layout.marker_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read update marker: {}", path.display()));
        }
    };
    Ok(Some(parse_marker(&raw)))
}

pub(crate) fn parse_marker(raw: &str) -> MarkerContents {
    let mut lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());
    let plan = lines
        .next()
        .and_then(|line| serde_json::from_str::<SwapPlan>(line).ok());
    let checkpoints = lines
        .filter_map(|line| serde_json::from_str::<SwapCheckpoint>(line).ok())
        .collect();
    MarkerContents { plan, checkpoints }
}

/// Seconds since the marker was written: the plan timestamp when readable, else the
/// file's modification time.
pub fn marker_age_secs(layout: &InstallLayout) -> Result<Option<u64>> {
    let now = current_unix_timestamp()?;
    if let Some(plan) = read_marker(layout)?.and_then(|contents| contents.plan) {
        return Ok(Some(now.saturating_sub(plan.started_at_unix)));
    }

    let path = layout.marker_path();
    match fs::metadata(&path) {
        Ok(metadata) => {
            let modified = metadata
                .modified()
                .with_context(|| format!("failed to read mtime of {}", path.display()))?;
            let age = modified.elapsed().map(|elapsed| elapsed.as_secs()).unwrap_or(0);
            Ok(Some(age))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to stat {}", path.display())),
    }
}

pub fn clear_marker(layout: &InstallLayout) -> Result<()> {
    let path = layout.marker_path();
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to clear update marker: {}", path.display()))
}
