use std::io::Write;

use anyhow::{Context as _, Result};
use clap::Args;

use super::Context;
use crate::git::Vcs;
use crate::tree;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Commit of the root repository to list from
    #[arg(default_value = "HEAD")]
    pub commit: String,
}

/// Handle `git-sneakernet list`
/// Output one `path commit` line per sub-repository, parents before children
pub fn handle<W: Write>(ctx: &Context, args: ListArgs, output: &mut W) -> Result<()> {
    let commit = ctx
        .vcs
        .resolve_commit(&ctx.root, &args.commit)
        .with_context(|| format!("Failed to resolve '{}'", args.commit))?;
    let mut walk = tree::walk(&ctx.vcs, &ctx.root, &commit);
    while let Some(node) = walk.next() {
        let node = node?;
        writeln!(output, "{} {}", node.path, node.commit)?;
        // Uninitialised submodules have nothing below them to list.
        if !ctx.vcs.repo_exists(&ctx.root.child(node.path.as_str())) {
            walk.skip_current_dir();
        }
    }
    Ok(())
}
