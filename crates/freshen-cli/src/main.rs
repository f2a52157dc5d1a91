use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod dispatch;
mod flows;
mod logging;
mod render;


#[derive(Parser, Debug)]
#[command(name = "freshen")]
#[command(about = "Self-updating application launcher", long_about = None)]
#[command(version)]
struct Cli {
    /// Installation directory; defaults to the current directory.
    #[arg(long)]
    install_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Default, PartialEq, Eq)]
enum Commands {
    /// Acquire requirements, update if a newer release exists, then start the app.
    #[default]
    Launch,
    /// Check for a newer release and hand off to the swap process if one exists.
    Check,
    /// Check and acquire declared requirements only.
    Bootstrap,
    /// Show the installed version and any update in progress.
    Status,
    /// Finish or discard an interrupted swap.
    Recover {
        /// Recover even if the swap may still be running.
        #[arg(long)]
        force: bool,
    },
    #[command(hide = true)]
    Swap {
        #[arg(long)]
        install_dir: PathBuf,
        #[arg(long)]
        staged_root: PathBuf,
        #[arg(long)]
        parent_pid: u32,
        #[arg(long)]
        marker: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}
