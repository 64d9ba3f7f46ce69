//! Producer and consumer sides of a sneakernet transfer.

use std::path::Path;

use crate::error::{Error, Result};
use crate::git::{RepoHandle, Vcs};
use crate::model::{CommitId, RepoPath};
use crate::transfer::{Bundler, ReconcileReport, Reconciler, TransferArtifact, UnpackedArtifact};
use crate::tree::{self, SnapshotDiff};

/// Diff the tree between `baseline` and `target` and bundle what changed
/// into `staging`.
pub fn produce<V: Vcs + ?Sized>(
    vcs: &V,
    root: &RepoHandle,
    baseline: Option<&CommitId>,
    target: &CommitId,
    staging: &Path,
    alias_prefix: &str,
) -> Result<(SnapshotDiff, TransferArtifact)> {
    match baseline {
        Some(base) => tracing::info!("making bundles to update from {} to {}", base, target),
        None => tracing::info!("no baseline, making full history bundles up to {}", target),
    }
    let diff = tree::diff(vcs, root, baseline, target)?;
    let units = Bundler::new(vcs, root, staging, alias_prefix).build_units(&diff, target)?;

    let mut artifact = TransferArtifact::default();
    for unit in units {
        artifact.insert(unit)?;
    }
    Ok((diff, artifact))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoStatus {
    Reconciled(ReconcileReport),
    /// The repository did not exist and was cloned from its unit first.
    Cloned(ReconcileReport),
    /// The artifact has nothing for this path.
    NoBundle,
    /// The unit could not be applied; siblings were still processed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReport {
    pub path: RepoPath,
    pub status: RepoStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub root: ReconcileReport,
    pub repos: Vec<RepoReport>,
    /// Units never reached by the post-apply walk.
    pub unvisited: Vec<RepoPath>,
}

impl ApplyReport {
    /// Sub-repositories whose unit could not be applied.
    pub fn failed(&self) -> impl Iterator<Item = &RepoReport> {
        self.repos
            .iter()
            .filter(|r| matches!(r.status, RepoStatus::Failed(_)))
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub check_divergence: bool,
    pub alias_prefix: String,
}

/// Apply an unpacked artifact to the tree rooted at `root`.
///
/// The root unit goes first, honouring `check_divergence`. The tree is then
/// walked at the updated `HEAD` and each sub-repository gets its unit, if
/// any, without divergence checks. Missing sub-repositories are cloned from
/// their unit.
pub fn consume<V: Vcs + ?Sized>(
    vcs: &V,
    root: &RepoHandle,
    artifact: &UnpackedArtifact,
    options: &ApplyOptions,
) -> Result<ApplyReport> {
    let root_bundle = artifact.unit(&RepoPath::root()).ok_or_else(|| {
        Error::malformed(artifact.dir(), format!("no {} in artifact", RepoPath::root().bundle_name()))
    })?;
    let root_report = Reconciler::new(vcs, &options.alias_prefix)
        .check_divergence(options.check_divergence)
        .apply(root, root_bundle)?;

    let reconciler = Reconciler::new(vcs, &options.alias_prefix);
    let head = vcs.resolve_commit(root, "HEAD")?;
    let mut repos = Vec::new();
    let mut walk = tree::walk(vcs, root, &head);
    while let Some(node) = walk.next() {
        let node = node?;
        let repo = root.child(node.path.as_str());
        let exists = vcs.repo_exists(&repo);
        tracing::debug!("{} -> {}", node.path, node.commit);

        let Some(bundle) = artifact.unit(&node.path) else {
            tracing::info!("skipping {}: no bundle", node.path);
            if !exists {
                walk.skip_current_dir();
            }
            repos.push(RepoReport {
                path: node.path,
                status: RepoStatus::NoBundle,
            });
            continue;
        };

        let applied = if exists {
            reconciler.apply(&repo, bundle).map(RepoStatus::Reconciled)
        } else {
            tracing::info!("cloning {} from its bundle", node.path);
            vcs.clone_from_bundle(bundle, &repo)
                .and_then(|_| reconciler.apply(&repo, bundle))
                .map(RepoStatus::Cloned)
        };
        let status = match applied {
            Ok(status) => status,
            Err(e @ (Error::MalformedArtifact { .. } | Error::Git { .. })) => {
                tracing::warn!("could not apply bundle for {}: {}", node.path, e);
                // Its pointer commit is likely missing, so its children are unreachable.
                walk.skip_current_dir();
                RepoStatus::Failed(e.to_string())
            }
            Err(e) => return Err(e),
        };
        repos.push(RepoReport {
            path: node.path,
            status,
        });
    }

    let unvisited = artifact
        .paths()
        .filter(|p| !p.is_root() && !repos.iter().any(|r| &r.path == *p))
        .cloned()
        .collect::<Vec<_>>();
    for path in &unvisited {
        tracing::debug!("bundle for {} was not needed by the updated tree", path);
    }

    Ok(ApplyReport {
        root: root_report,
        repos,
        unvisited,
    })
}
