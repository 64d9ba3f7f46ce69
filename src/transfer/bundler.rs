use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::git::{RepoHandle, ScopedBranch, Vcs};
use crate::model::{CommitId, RepoPath, RevRange, TransferKind, TransferUnit};
use crate::tree::SnapshotDiff;

/// Writes one bundle per changed or new repository into a staging directory.
pub struct Bundler<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    root: RepoHandle,
    staging: PathBuf,
    alias_prefix: String,
}

impl<'a, V: Vcs + ?Sized> Bundler<'a, V> {
    pub fn new(vcs: &'a V, root: &RepoHandle, staging: &Path, alias_prefix: &str) -> Self {
        Bundler {
            vcs,
            root: root.clone(),
            staging: staging.to_path_buf(),
            alias_prefix: alias_prefix.to_string(),
        }
    }

    /// Incremental units for changed repositories, full units for added
    /// ones, nothing for removed ones, and always a full unit for the root.
    pub fn build_units(&self, diff: &SnapshotDiff, target: &CommitId) -> Result<Vec<TransferUnit>> {
        let mut units = Vec::with_capacity(diff.changed.len() + diff.added.len() + 1);
        for (path, (old, new)) in &diff.changed {
            // A pointer moved back to an ancestor leaves nothing between the
            // two commits, so the whole history up to the new one is sent.
            let kind = if self.vcs.is_ancestor(&self.repo_for(path), new, old)? {
                tracing::info!("{} moved back from {} to {}", path, old, new);
                TransferKind::Full
            } else {
                tracing::info!("need to update {} from {} to {}", path, old, new);
                TransferKind::Incremental {
                    baseline: old.clone(),
                }
            };
            units.push(self.bundle(path, kind, new)?);
        }
        for (path, new) in &diff.added {
            tracing::info!("new sub-repository {} at {}", path, new);
            units.push(self.bundle(path, TransferKind::Full, new)?);
        }
        for path in &diff.removed {
            tracing::info!("{} was removed, no bundle needed", path);
        }
        units.push(self.bundle(&RepoPath::root(), TransferKind::Full, target)?);
        Ok(units)
    }

    fn repo_for(&self, path: &RepoPath) -> RepoHandle {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.child(path.as_str())
        }
    }

    /// Bundle the history of `path` up to `target`.
    ///
    /// Branches whose tip is `target` are carried by name, and `HEAD` when it
    /// sits on `target`. If neither applies the commit has no name, so a
    /// disposable alias stands in for the duration of the bundle call.
    pub fn bundle(&self, path: &RepoPath, kind: TransferKind, target: &CommitId) -> Result<TransferUnit> {
        let repo = self.repo_for(path);
        let output = self.staging.join(path.bundle_name());
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut include: Vec<String> = self
            .vcs
            .list_branches(&repo)?
            .into_iter()
            .filter(|(name, tip)| tip == target && !name.starts_with(&self.alias_prefix))
            .map(|(name, _)| name)
            .collect();
        if self.vcs.resolve_commit(&repo, "HEAD").ok().as_ref() == Some(target) {
            include.push("HEAD".to_string());
        }
        let alias = if include.is_empty() {
            let alias = ScopedBranch::create(self.vcs, &repo, &self.alias_prefix, target)?;
            include.push(alias.name().to_string());
            Some(alias)
        } else {
            None
        };

        let range = RevRange {
            exclude: match &kind {
                TransferKind::Incremental { baseline } => Some(baseline.clone()),
                TransferKind::Full => None,
            },
            include,
        };
        tracing::debug!("bundling {} as {}", path, range);
        self.vcs.create_bundle(&repo, &output, &range)?;
        drop(alias);

        Ok(TransferUnit {
            path: path.clone(),
            kind,
            target: target.clone(),
            payload: output,
        })
    }
}
