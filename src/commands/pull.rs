use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use super::{write_reconcile_report, Context};
use crate::transfer::Reconciler;

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Bundle file to apply
    pub bundle: PathBuf,

    /// Fail if the checked-out branch cannot be fast-forwarded
    #[arg(long)]
    pub check_divergence: bool,
}

/// Handle `git-sneakernet pull`
pub fn handle<W: Write>(ctx: &Context, args: PullArgs, output: &mut W) -> Result<()> {
    let bundle = ctx.absolute(&args.bundle);
    if !bundle.is_file() {
        anyhow::bail!("Bundle {:?} does not exist", bundle);
    }
    let report = Reconciler::new(&ctx.vcs, &ctx.config.temp_branch_prefix)
        .check_divergence(args.check_divergence || ctx.config.check_divergence)
        .apply(&ctx.root, &bundle)
        .with_context(|| format!("Failed to apply {:?}", bundle))?;
    write_reconcile_report(output, ".", &report)
}
