use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use super::{write_reconcile_report, Context};
use crate::sync::{self, ApplyOptions, ApplyReport, RepoStatus};
use crate::transfer::UnpackedArtifact;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Artifact file produced by `pack`
    pub artifact: PathBuf,

    /// Fail if the checked-out branch of the root repository cannot be fast-forwarded
    #[arg(long)]
    pub check_divergence: bool,
}

/// Handle `git-sneakernet apply`
pub fn handle<W: Write>(ctx: &Context, args: ApplyArgs, output: &mut W) -> Result<()> {
    let path = ctx.absolute(&args.artifact);
    let artifact = UnpackedArtifact::unpack_file(&path, ctx.config.scratch_dir.as_deref())
        .with_context(|| format!("Failed to read artifact {:?}", path))?;
    if let Some(manifest) = artifact.manifest() {
        tracing::info!(
            "artifact created {} targeting {} with {} units",
            manifest.created_at,
            manifest.target,
            manifest.units.len()
        );
    }

    let options = ApplyOptions {
        check_divergence: args.check_divergence || ctx.config.check_divergence,
        alias_prefix: ctx.config.temp_branch_prefix.clone(),
    };
    let report = sync::consume(&ctx.vcs, &ctx.root, &artifact, &options)?;
    write_apply_report(output, &report)?;

    let failed: Vec<_> = report.failed().map(|r| r.path.as_str()).collect();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} sub-repositories could not be updated: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

pub fn write_apply_report<W: Write>(output: &mut W, report: &ApplyReport) -> Result<()> {
    write_reconcile_report(output, ".", &report.root)?;
    for repo in &report.repos {
        let label = repo.path.as_str();
        match &repo.status {
            RepoStatus::Reconciled(r) => write_reconcile_report(output, label, r)?,
            RepoStatus::Cloned(r) => {
                writeln!(output, "{}: cloned from bundle", label)?;
                write_reconcile_report(output, label, r)?;
            }
            RepoStatus::NoBundle => writeln!(output, "{}: no bundle, unchanged", label)?,
            RepoStatus::Failed(reason) => writeln!(output, "{}: failed: {}", label, reason)?,
        }
    }
    for path in &report.unvisited {
        writeln!(output, "{}: bundle not used by the updated tree", path)?;
    }
    Ok(())
}
