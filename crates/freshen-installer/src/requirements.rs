use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use freshen_core::{CommandSpec, RequirementConfig};
use tracing::{info, warn};

use crate::process::resolve_program;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementStatus {
    Present,
    Acquired,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Acquired => "acquired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementReport {
    pub name: String,
    pub status: RequirementStatus,
}

/// Checks each requirement once and runs its acquisition command when the check fails.
/// A requirement that is still unmet afterwards is a startup error.
pub fn ensure_requirements(
    requirements: &[RequirementConfig],
    cwd: &Path,
) -> Result<Vec<RequirementReport>> {
    let mut reports = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        if command_succeeds(&requirement.check, cwd)? {
            info!(requirement = %requirement.name, "requirement present");
            reports.push(RequirementReport {
                name: requirement.name.clone(),
                status: RequirementStatus::Present,
            });
            continue;
        }

        let Some(install) = &requirement.install else {
            return Err(anyhow!(
                "requirement '{}' is missing and has no install command",
                requirement.name
            ));
        };
        warn!(requirement = %requirement.name, command = %install, "requirement missing; acquiring");
        if !command_succeeds(install, cwd)? {
            return Err(anyhow!(
                "failed to acquire requirement '{}' with '{}'",
                requirement.name,
                install
            ));
        }
        if !command_succeeds(&requirement.check, cwd)? {
            return Err(anyhow!(
                "requirement '{}' is still missing after running '{}'",
                requirement.name,
                install
            ));
        }
        reports.push(RequirementReport {
            name: requirement.name.clone(),
            status: RequirementStatus::Acquired,
        });
    }
    Ok(reports)
}

/// A command that cannot be started counts as a failed check rather than an error, so a
/// missing interpreter routes to the install command.
fn command_succeeds(command: &CommandSpec, cwd: &Path) -> Result<bool> {
    let status = Command::new(resolve_program(command.program(), cwd))
        .args(command.args())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) => Ok(status.success()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to run '{command}'")),
    }
}
