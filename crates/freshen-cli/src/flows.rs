use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use freshen_core::{CommandSpec, LauncherConfig, ReleaseSourceKind};
use freshen_installer::{
    ensure_requirements, marker_age_secs, marker_exists, read_installed_version, read_marker,
    recover_interrupted_swap, InstallLayout, InstallNames, ProcessLauncher, RecoverOutcome,
    RequirementReport, SwapExecutor, SwapTiming, SystemProcessLauncher, UpdateError,
    UpdateOrchestrator, UpdateOutcome,
};
use freshen_release::source_from_config;
use tracing::{error, info, warn};

use crate::logging::{init_swap_tracing, SWAP_LOG_FILE};
use crate::render::TerminalRenderer;

/// How long a relaunched launcher waits for the swap that started it to remove the marker.
pub(crate) const RELAUNCH_HANDOFF_WAIT: Duration = Duration::from_secs(10);

pub(crate) struct LaunchContext {
    pub(crate) config: LauncherConfig,
    pub(crate) layout: InstallLayout,
}

impl LaunchContext {
    pub(crate) fn load(install_dir: Option<PathBuf>) -> Result<Self> {
        let dir = match install_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to resolve current directory")?,
        };
        let dir = dir.canonicalize().with_context(|| {
            format!("failed to resolve installation directory {}", dir.display())
        })?;
        Self::from_dir(dir)
    }

    pub(crate) fn from_dir(dir: PathBuf) -> Result<Self> {
        let config = LauncherConfig::load(&dir)?;
        let layout = InstallLayout::from_config(dir, &config);
        Ok(Self { config, layout })
    }

    fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.config.update.stuck_after_secs)
    }

    fn relaunch_command(&self, launcher_exe: &Path) -> CommandSpec {
        self.config
            .app
            .relaunch
            .clone()
            .unwrap_or_else(|| default_relaunch_command(launcher_exe, self.layout.install_dir()))
    }

    fn log_dir(&self) -> PathBuf {
        swap_log_dir(&self.config, &self.layout)
    }
}

pub(crate) fn default_relaunch_command(launcher_exe: &Path, install_dir: &Path) -> CommandSpec {
    CommandSpec::new(
        launcher_exe.display().to_string(),
        [
            "--install-dir".to_string(),
            install_dir.display().to_string(),
            "launch".to_string(),
        ],
    )
}

/// Relative `log_dir` values resolve against the installation directory.
pub(crate) fn swap_log_dir(config: &LauncherConfig, layout: &InstallLayout) -> PathBuf {
    match &config.update.log_dir {
        Some(dir) => layout.install_dir().join(dir),
        None => layout.default_log_dir(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MarkerDisposition {
    Clear,
    Deferred { last_state: Option<String> },
    Stuck { age_secs: u64, last_state: Option<String> },
}

/// Checkpoints after which the swap may already have started this launcher. The
/// `relaunched` line is only written once the spawn returns, so `restored` counts too.
const HANDOFF_STATES: [&str; 2] = ["restored", "relaunched"];

/// Decides whether the application may start. A marker whose swap is relaunching is
/// given `handoff_wait` to disappear; a failed or overdue swap is reported as stuck.
pub(crate) fn inspect_marker(
    layout: &InstallLayout,
    stuck_after: Duration,
    handoff_wait: Duration,
) -> Result<MarkerDisposition> {
    let Some(mut contents) = read_marker(layout)? else {
        return Ok(MarkerDisposition::Clear);
    };

    if contents
        .last_state()
        .is_some_and(|state| HANDOFF_STATES.contains(&state))
    {
        info!("swap is handing off; waiting for the update marker to clear");
        if wait_for_marker_clear(layout, handoff_wait) {
            return Ok(MarkerDisposition::Clear);
        }
        match read_marker(layout)? {
            Some(latest) => contents = latest,
            None => return Ok(MarkerDisposition::Clear),
        }
    }

    let last_state = contents.last_state().map(str::to_string);
    let age_secs = marker_age_secs(layout)?.unwrap_or(0);
    if last_state.as_deref() == Some("failed") || age_secs >= stuck_after.as_secs() {
        return Ok(MarkerDisposition::Stuck {
            age_secs,
            last_state,
        });
    }
    Ok(MarkerDisposition::Deferred { last_state })
}

fn wait_for_marker_clear(layout: &InstallLayout, timeout: Duration) -> bool {
    let started = Instant::now();
    loop {
        if !marker_exists(layout) {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(200));
    }
}

pub(crate) fn stuck_diagnostic_lines(
    layout: &InstallLayout,
    log_dir: &Path,
    age_secs: u64,
    last_state: Option<&str>,
) -> Vec<String> {
    vec![
        format!(
            "update marker {} has been present for {age_secs}s (last checkpoint={})",
            layout.marker_path().display(),
            last_state.unwrap_or("none")
        ),
        format!(
            "the application was not started; see {} and run `freshen --install-dir {} recover`",
            log_dir.join(SWAP_LOG_FILE).display(),
            layout.install_dir().display()
        ),
    ]
}

fn run_update_check(ctx: &LaunchContext, renderer: TerminalRenderer) -> UpdateOutcome {
    let source = match source_from_config(&ctx.config, ctx.layout.install_dir()) {
        Ok(source) => source,
        Err(err) => {
            error!(kind = err.kind(), error = %err, "release source unavailable");
            return UpdateOutcome::CheckFailed(UpdateError::Release(err));
        }
    };
    let launcher_exe = match std::env::current_exe() {
        Ok(path) => path,
        Err(err) => {
            let err = anyhow::Error::new(err).context("failed to locate the launcher executable");
            error!(error = %format!("{err:#}"), "update check skipped");
            return UpdateOutcome::CheckFailed(UpdateError::Filesystem(err));
        }
    };

    let launcher = SystemProcessLauncher;
    let progress = renderer.download_progress("release");
    UpdateOrchestrator::new(
        ctx.layout.clone(),
        source,
        &launcher,
        &launcher_exe,
        ctx.relaunch_command(&launcher_exe),
        SwapTiming::from_config(&ctx.config),
    )
    .with_progress(&progress)
    .run()
}

pub(crate) fn format_requirement_lines(reports: &[RequirementReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| format!("requirement {}: {}", report.name, report.status.as_str()))
        .collect()
}

pub(crate) fn run_bootstrap_command(ctx: &LaunchContext, renderer: TerminalRenderer) -> Result<()> {
    let reports = ensure_requirements(&ctx.config.requirements, ctx.layout.install_dir())
        .context("requirements are not satisfied")?;
    for line in format_requirement_lines(&reports) {
        renderer.print_status("ok", &line);
    }
    Ok(())
}

pub(crate) fn run_check_command(ctx: &LaunchContext, renderer: TerminalRenderer) -> Result<()> {
    match run_update_check(ctx, renderer) {
        UpdateOutcome::UpToDate(version) => {
            renderer.print_status("ok", &format!("up to date (version={version})"));
            Ok(())
        }
        UpdateOutcome::UpdateLaunched(version) => {
            renderer.print_status(
                "ok",
                &format!("update to {version} staged; swap process started"),
            );
            Ok(())
        }
        UpdateOutcome::CheckFailed(err) => Err(anyhow!(
            "update check failed (reason={}): {err}",
            err.kind()
        )),
    }
}

pub(crate) fn run_launch_command(ctx: &LaunchContext, renderer: TerminalRenderer) -> Result<()> {
    run_bootstrap_command(ctx, renderer).context("cannot start application")?;

    match run_update_check(ctx, renderer) {
        UpdateOutcome::UpdateLaunched(version) => {
            renderer.print_status(
                "ok",
                &format!("updating to {version}; the application restarts when the swap completes"),
            );
            return Ok(());
        }
        UpdateOutcome::UpToDate(_) => {}
        UpdateOutcome::CheckFailed(err) => {
            renderer.print_status(
                "warn",
                &format!("update check skipped (reason={}): {err}", err.kind()),
            );
        }
    }

    match inspect_marker(&ctx.layout, ctx.stuck_after(), RELAUNCH_HANDOFF_WAIT)? {
        MarkerDisposition::Clear => {}
        MarkerDisposition::Deferred { last_state } => {
            renderer.print_status(
                "warn",
                &format!(
                    "update in progress (last checkpoint={}); not starting application",
                    last_state.as_deref().unwrap_or("none")
                ),
            );
            return Ok(());
        }
        MarkerDisposition::Stuck {
            age_secs,
            last_state,
        } => {
            error!(
                marker = %ctx.layout.marker_path().display(),
                age_secs,
                last_state = last_state.as_deref().unwrap_or("none"),
                "update appears stuck"
            );
            for line in
                stuck_diagnostic_lines(&ctx.layout, &ctx.log_dir(), age_secs, last_state.as_deref())
            {
                renderer.print_status("error", &line);
            }
            return Err(anyhow!(
                "update is stuck (reason=marker_present age={age_secs}s)"
            ));
        }
    }

    let command = &ctx.config.app.command;
    let pid = SystemProcessLauncher
        .spawn_detached(command, ctx.layout.install_dir())
        .context("failed to start application")?;
    info!(pid, command = %command, "application started");
    renderer.print_status("ok", &format!("started {command} (pid={pid})"));
    Ok(())
}

pub(crate) fn status_lines(ctx: &LaunchContext) -> Result<Vec<String>> {
    let layout = &ctx.layout;
    let mut lines = vec![format!("install dir: {}", layout.install_dir().display())];

    match read_installed_version(layout) {
        Ok(version) => lines.push(format!("installed version: {version}")),
        Err(UpdateError::MissingVersionFile { .. }) => {
            lines.push("installed version: missing".to_string())
        }
        Err(err) => return Err(err.into()),
    }

    let release = &ctx.config.release;
    lines.push(match release.kind {
        ReleaseSourceKind::Github => format!("release source: github {}/{}", release.owner, release.repo),
        ReleaseSourceKind::Feed => format!(
            "release source: feed {}",
            release
                .feed
                .as_deref()
                .map(|feed| feed.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        ),
    });

    match read_marker(layout)? {
        None => lines.push("update: idle".to_string()),
        Some(contents) => {
            let age_secs = marker_age_secs(layout)?.unwrap_or(0);
            let last_state = contents.last_state().unwrap_or("pending");
            let target = contents
                .plan
                .as_ref()
                .map(|plan| plan.version.as_str())
                .unwrap_or("unknown");
            let mut line = format!(
                "update: in progress target={target} last_checkpoint={last_state} age={age_secs}s"
            );
            if last_state == "failed" || age_secs >= ctx.config.update.stuck_after_secs {
                line.push_str(" (stuck; run `freshen recover`)");
            }
            lines.push(line);
        }
    }

    lines.push(format!(
        "staging: {}",
        if layout.staging_dir().exists() {
            "present"
        } else {
            "absent"
        }
    ));
    Ok(lines)
}

pub(crate) fn run_status_command(ctx: &LaunchContext, renderer: TerminalRenderer) -> Result<()> {
    renderer.print_section("freshen status");
    renderer.print_lines(&status_lines(ctx)?);
    Ok(())
}

/// A live swap must not be raced: recovery needs the marker to be overdue, a recorded
/// failure, or an explicit `--force`.
pub(crate) fn ensure_recover_allowed(
    age_secs: u64,
    last_state: Option<&str>,
    stuck_after: Duration,
    force: bool,
) -> Result<()> {
    if force || last_state == Some("failed") || age_secs >= stuck_after.as_secs() {
        return Ok(());
    }
    Err(anyhow!(
        "swap may still be running (age={age_secs}s stuck_after={}s); pass --force to recover anyway",
        stuck_after.as_secs()
    ))
}

pub(crate) fn run_recover_command(
    ctx: &LaunchContext,
    force: bool,
    renderer: TerminalRenderer,
) -> Result<()> {
    let Some(contents) = read_marker(&ctx.layout)? else {
        renderer.print_status("ok", "nothing to recover");
        return Ok(());
    };
    let age_secs = marker_age_secs(&ctx.layout)?.unwrap_or(0);
    ensure_recover_allowed(age_secs, contents.last_state(), ctx.stuck_after(), force)?;

    match recover_interrupted_swap(&ctx.layout, &SystemProcessLauncher)? {
        RecoverOutcome::NothingToRecover => renderer.print_status("ok", "nothing to recover"),
        RecoverOutcome::Resumed(version) => {
            renderer.print_status("ok", &format!("swap to {version} completed; application relaunched"))
        }
        RecoverOutcome::Cleared => {
            renderer.print_status("warn", "staged release was gone; cleared the update marker")
        }
    }
    Ok(())
}

/// Entry point of the detached swap process.
pub(crate) fn run_swap_command(
    install_dir: &Path,
    staged_root: &Path,
    parent_pid: u32,
    marker: String,
) -> Result<()> {
    let loaded = LauncherConfig::load(install_dir);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    let names = InstallNames {
        marker_file: marker,
        ..InstallNames::from_config(&config)
    };
    let layout = InstallLayout::new(install_dir, names);
    let _guard = init_swap_tracing(&swap_log_dir(&config, &layout))?;
    if let Err(err) = &loaded {
        warn!(error = %format!("{err:#}"), "failed to load config; using defaults for logging");
    }

    let launcher = SystemProcessLauncher;
    let executor = SwapExecutor::from_marker(&layout, staged_root, &launcher).map_err(|err| {
        error!(error = %err, "cannot start swap");
        err
    })?;
    if executor.plan().parent_pid != parent_pid {
        warn!(
            recorded = executor.plan().parent_pid,
            argument = parent_pid,
            "parent pid argument differs from the recorded plan; using the plan"
        );
    }
    executor.run()?;
    Ok(())
}
