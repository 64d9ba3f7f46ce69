use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use super::Context;
use crate::error::Error;
use crate::git::Vcs;
use crate::sync;

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Artifact file to write
    pub output: PathBuf,

    /// Commits of the root repository to pack, as [baseline]..[target]
    pub range: Option<String>,
}

/// Revisions named by a `[baseline]..[target]` argument, still unresolved.
#[derive(Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub baseline: Option<String>,
    pub target: String,
}

pub fn parse_range(range: Option<&str>) -> Result<RangeSpec, Error> {
    let Some(range) = range else {
        return Ok(RangeSpec {
            baseline: None,
            target: "HEAD".to_string(),
        });
    };
    let (baseline, target) = range
        .split_once("..")
        .ok_or_else(|| Error::InvalidRange(range.to_string()))?;
    // `a...b` is a symmetric difference, which has no single baseline.
    if target.starts_with('.') {
        return Err(Error::InvalidRange(range.to_string()));
    }
    Ok(RangeSpec {
        baseline: (!baseline.is_empty()).then(|| baseline.to_string()),
        target: if target.is_empty() {
            "HEAD".to_string()
        } else {
            target.to_string()
        },
    })
}

/// Handle `git-sneakernet pack`
pub fn handle<W: Write>(ctx: &Context, args: PackArgs, output: &mut W) -> Result<()> {
    let spec = parse_range(args.range.as_deref())?;
    let target = ctx
        .vcs
        .resolve_commit(&ctx.root, &spec.target)
        .with_context(|| format!("Failed to resolve target '{}'", spec.target))?;
    let baseline = spec
        .baseline
        .as_deref()
        .map(|rev| {
            ctx.vcs
                .resolve_commit(&ctx.root, rev)
                .with_context(|| format!("Failed to resolve baseline '{}'", rev))
        })
        .transpose()?;

    let staging = ctx.scratch()?;
    let (diff, artifact) = sync::produce(
        &ctx.vcs,
        &ctx.root,
        baseline.as_ref(),
        &target,
        staging.path(),
        &ctx.config.temp_branch_prefix,
    )?;

    let destination = ctx.absolute(&args.output);
    let manifest = artifact.manifest(baseline.as_ref());
    artifact
        .pack_to_file(manifest.as_ref(), &destination)
        .with_context(|| format!("Failed to write artifact {:?}", destination))?;

    if diff.is_empty() {
        writeln!(output, "no sub-repository changed; only the root is packed")?;
    }
    for unit in artifact.units() {
        writeln!(output, "{} {}", unit.path.bundle_name(), unit.target)?;
    }
    if !diff.removed.is_empty() {
        let removed: Vec<_> = diff.removed.iter().map(|p| p.as_str()).collect();
        writeln!(output, "removed: {}", removed.join(" "))?;
    }
    tracing::info!(
        "wrote {} bundles to {:?}",
        artifact.units().len(),
        destination
    );
    Ok(())
}
