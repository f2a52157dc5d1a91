use std::path::PathBuf;

use anyhow::Result;

use crate::flows::{
    run_bootstrap_command, run_check_command, run_launch_command, run_recover_command,
    run_status_command, run_swap_command, LaunchContext,
};
use crate::logging::init_console_tracing;
use crate::render::TerminalRenderer;
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or_default() {
        Commands::Swap {
            install_dir,
            staged_root,
            parent_pid,
            marker,
        } => run_swap_command(&install_dir, &staged_root, parent_pid, marker),
        Commands::Launch => {
            let (ctx, renderer) = open_session(cli.install_dir)?;
            run_launch_command(&ctx, renderer)
        }
        Commands::Check => {
            let (ctx, renderer) = open_session(cli.install_dir)?;
            run_check_command(&ctx, renderer)
        }
        Commands::Bootstrap => {
            let (ctx, renderer) = open_session(cli.install_dir)?;
            run_bootstrap_command(&ctx, renderer)
        }
        Commands::Status => {
            let (ctx, renderer) = open_session(cli.install_dir)?;
            run_status_command(&ctx, renderer)
        }
        Commands::Recover { force } => {
            let (ctx, renderer) = open_session(cli.install_dir)?;
            run_recover_command(&ctx, force, renderer)
        }
    }
}

fn open_session(install_dir: Option<PathBuf>) -> Result<(LaunchContext, TerminalRenderer)> {
    init_console_tracing();
    let ctx = LaunchContext::load(install_dir)?;
    Ok((ctx, TerminalRenderer::current()))
}
