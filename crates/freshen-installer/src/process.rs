use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use freshen_core::CommandSpec;
use sysinfo::{Pid, System};
use tracing::debug;

/// Starts processes that must outlive the caller.
pub trait ProcessLauncher {
    /// Spawns `command` with `cwd` as working directory, detached from the caller, and
    /// returns its process id without waiting for it.
    fn spawn_detached(&self, command: &CommandSpec, cwd: &Path) -> Result<u32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessLauncher;

impl ProcessLauncher for SystemProcessLauncher {
    fn spawn_detached(&self, command: &CommandSpec, cwd: &Path) -> Result<u32> {
        let program = resolve_program(command.program(), cwd);
        let mut process = Command::new(&program);
        process
            .args(command.args())
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut process);

        let child = process
            .spawn()
            .with_context(|| format!("failed to spawn '{command}' in {}", cwd.display()))?;
        debug!(pid = child.id(), command = %command, "spawned detached process");
        Ok(child.id())
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}

/// Relative programs with a directory part (`./freshen`, `bin/app`) resolve against the
/// working directory; bare names are left for PATH lookup.
pub(crate) fn resolve_program(program: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        return cwd.join(path);
    }
    path.to_path_buf()
}

pub fn process_is_running(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}

/// Polls until `pid` is gone or `timeout` elapses. Returns whether the process exited.
pub fn wait_for_process_exit(pid: u32, timeout: Duration) -> bool {
    let started = Instant::now();
    loop {
        if !process_is_running(pid) {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(100));
    }
}
