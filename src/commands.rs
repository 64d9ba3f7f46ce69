pub mod apply;
pub mod list;
pub mod pack;
pub mod pull;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tempfile::TempDir;

use crate::config::SneakernetConfig;
use crate::git::{GitCli, RepoHandle};
use crate::model::ReconcileOutcome;
use crate::transfer::{HeadAction, ReconcileReport};

/// Everything a command handler needs: settings, the git layer and the root
/// repository it acts on.
pub struct Context {
    pub config: SneakernetConfig,
    pub vcs: GitCli,
    pub root: RepoHandle,
    cwd: PathBuf,
}

impl Context {
    pub fn new(config: SneakernetConfig, directory: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read the current directory")?;
        let root = match directory {
            Some(dir) => cwd.join(dir),
            None => cwd.clone(),
        };
        tracing::debug!("root repository: {:?}", root);
        Ok(Context {
            vcs: GitCli::new(&config.git_binary),
            config,
            root: RepoHandle::new(root),
            cwd,
        })
    }

    /// Paths given on the command line are relative to where we were
    /// started; git runs elsewhere, so they must be made absolute first.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.cwd.join(path)
    }

    /// Fresh temporary directory under the configured scratch dir.
    pub fn scratch(&self) -> Result<TempDir> {
        let dir = match &self.config.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create scratch dir {:?}", parent))?;
                TempDir::new_in(parent)?
            }
            None => TempDir::new()?,
        };
        Ok(dir)
    }
}

/// Print one line per branch outcome, then where HEAD ended up.
pub fn write_reconcile_report<W: Write>(
    output: &mut W,
    label: &str,
    report: &ReconcileReport,
) -> Result<()> {
    for branch in &report.branches {
        let local = branch
            .local
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        writeln!(
            output,
            "{}: {} {} {} -> {}",
            label, branch.name, branch.outcome, local, branch.incoming
        )?;
    }
    match &report.head {
        HeadAction::None => {}
        HeadAction::AlreadyThere(commit) => writeln!(output, "{}: HEAD at {}", label, commit)?,
        HeadAction::Detached(commit) => {
            writeln!(output, "{}: HEAD detached at {}", label, commit)?
        }
    }
    if report
        .branches
        .iter()
        .any(|b| b.outcome == ReconcileOutcome::DivergedSkipped)
    {
        writeln!(
            output,
            "{}: diverged branches were left alone; merge or rebase them manually, then apply again",
            label
        )?;
    }
    Ok(())
}
