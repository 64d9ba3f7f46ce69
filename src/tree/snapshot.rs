use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::git::{RepoHandle, Vcs};
use crate::model::{CommitId, RepoPath, Snapshot};

use super::walker::walk;

/// Record the commit of every sub-repository reachable from `commit`.
pub fn capture<V: Vcs + ?Sized>(vcs: &V, root: &RepoHandle, commit: &CommitId) -> Result<Snapshot> {
    Ok(Snapshot {
        root: commit.clone(),
        entries: walk(vcs, root, commit).collect::<Result<_>>()?,
    })
}

/// Which sub-repositories need history transferred between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Present in both, at different commits: `(old, new)`.
    pub changed: BTreeMap<RepoPath, (CommitId, CommitId)>,
    /// Present only at the target (or everything, without a baseline).
    pub added: BTreeMap<RepoPath, CommitId>,
    /// Present only at the baseline. These never get a unit.
    pub removed: BTreeSet<RepoPath>,
}

impl SnapshotDiff {
    /// Compare two snapshots. Without a baseline every target entry counts
    /// as added.
    pub fn between(baseline: Option<&Snapshot>, target: &Snapshot) -> Self {
        let target_map: BTreeMap<_, _> = target
            .entries
            .iter()
            .map(|node| (&node.path, &node.commit))
            .collect();

        let Some(baseline) = baseline else {
            return SnapshotDiff {
                added: target_map
                    .into_iter()
                    .map(|(p, c)| (p.clone(), c.clone()))
                    .collect(),
                ..Default::default()
            };
        };

        let mut result = SnapshotDiff::default();
        for node in &baseline.entries {
            match target_map.get(&node.path) {
                None => {
                    result.removed.insert(node.path.clone());
                }
                Some(&new) if *new != node.commit => {
                    result
                        .changed
                        .insert(node.path.clone(), (node.commit.clone(), new.clone()));
                }
                Some(_) => {}
            }
        }
        for (path, commit) in target_map {
            if baseline.get(path).is_none() {
                result.added.insert(path.clone(), commit.clone());
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// Walk the tree at `baseline` (when given) and at `target` and compare.
pub fn diff<V: Vcs + ?Sized>(
    vcs: &V,
    root: &RepoHandle,
    baseline: Option<&CommitId>,
    target: &CommitId,
) -> Result<SnapshotDiff> {
    let target_snapshot = capture(vcs, root, target)?;
    let baseline_snapshot = match baseline {
        Some(commit) => Some(capture(vcs, root, commit)?),
        None => None,
    };
    for snapshot in baseline_snapshot.iter().chain([&target_snapshot]) {
        tracing::debug!(
            "{} sub-repositories at {}",
            snapshot.entries.len(),
            snapshot.root
        );
    }
    Ok(SnapshotDiff::between(
        baseline_snapshot.as_ref(),
        &target_snapshot,
    ))
}
