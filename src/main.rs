#![deny(clippy::mod_module_files)]
use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;
mod git;
mod model;
mod sync;
mod transfer;
mod tree;

use commands::{apply::ApplyArgs, list::ListArgs, pack::PackArgs, pull::PullArgs, Context};
use config::SneakernetConfig;

/// Move a tree of git repositories and submodules between disconnected
/// machines as a single file.
#[derive(Parser, Debug)]
#[command(name = "git-sneakernet", version, long_about = None)]
struct Cli {
    /// Run as if started in <DIR> instead of the current directory
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Log capability calls and other debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bundle the changes in [baseline]..[target] into an artifact
    Pack(PackArgs),
    /// Apply an artifact produced by `pack`
    Apply(ApplyArgs),
    /// List every sub-repository reachable from a commit
    List(ListArgs),
    /// Apply a single bundle to the current repository
    Pull(PullArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SneakernetConfig::load()?;
    let ctx = Context::new(config, cli.directory.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Pack(args) => commands::pack::handle(&ctx, args, &mut stdout),
        Commands::Apply(args) => commands::apply::handle(&ctx, args, &mut stdout),
        Commands::List(args) => commands::list::handle(&ctx, args, &mut stdout),
        Commands::Pull(args) => commands::pull::handle(&ctx, args, &mut stdout),
    }
}
