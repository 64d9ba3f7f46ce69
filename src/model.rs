//! Data model shared by the tree walker, bundler and reconciler.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Content hash identifying one version of a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        CommitId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}

/// Path of a repository relative to the tree root, `/`-separated.
/// The root itself is `"."`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath(String);

impl RepoPath {
    pub const ROOT: &'static str = ".";

    pub fn root() -> Self {
        RepoPath(Self::ROOT.to_string())
    }

    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            Self::root()
        } else {
            RepoPath(trimmed.to_string())
        }
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn join(&self, child: &str) -> Self {
        if self.is_root() {
            RepoPath::new(child)
        } else {
            RepoPath::new(format!("{}/{}", self.0, child))
        }
    }

    /// File name of this repository's unit inside an artifact. The root maps
    /// to `..bundle`, which no directory name can collide with.
    pub fn bundle_name(&self) -> String {
        format!("{}.bundle", self.0)
    }

    /// Inverse of [`RepoPath::bundle_name`].
    pub fn from_bundle_name(name: &str) -> Option<Self> {
        name.strip_suffix(".bundle")
            .filter(|p| !p.is_empty())
            .map(RepoPath::new)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoPath {
    fn from(s: &str) -> Self {
        RepoPath::new(s)
    }
}

/// One sub-repository discovered by a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoNode {
    pub path: RepoPath,
    pub commit: CommitId,
}

/// A sub-repository pointer as recorded in a parent's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRepoPointer {
    /// Path relative to the parent repository.
    pub path: String,
    pub commit: CommitId,
}

/// Commits of every sub-repository of a tree at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub root: CommitId,
    /// Walk order: depth-first, parents before children.
    pub entries: Vec<RepoNode>,
}

impl Snapshot {
    pub fn get(&self, path: &RepoPath) -> Option<&CommitId> {
        self.entries
            .iter()
            .find(|node| &node.path == path)
            .map(|node| &node.commit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferKind {
    Full,
    Incremental { baseline: CommitId },
}

/// History needed to advance one repository to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUnit {
    pub path: RepoPath,
    pub kind: TransferKind,
    pub target: CommitId,
    /// Bundle file holding the history.
    pub payload: PathBuf,
}

impl TransferUnit {
    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }
}

/// Range expression handed to the bundle writer: everything reachable from
/// `include` but not from `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevRange {
    pub exclude: Option<CommitId>,
    pub include: Vec<String>,
}

impl fmt::Display for RevRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(exclude) = &self.exclude {
            write!(f, "{}..", exclude)?;
        }
        f.write_str(&self.include.join(" "))
    }
}

/// A branch named inside a transfer unit and the commit it should move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub incoming_commit: CommitId,
}

/// What a bundle declares: the branches it carries and, optionally, where
/// HEAD should end up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitManifest {
    pub branches: Vec<BranchRef>,
    pub incoming_head: Option<CommitId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    UpToDate,
    FastForwarded,
    AheadSkipped,
    DivergedSkipped,
}

impl ReconcileOutcome {
    pub fn is_skip(self) -> bool {
        matches!(
            self,
            ReconcileOutcome::AheadSkipped | ReconcileOutcome::DivergedSkipped
        )
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::UpToDate => "up to date",
            ReconcileOutcome::FastForwarded => "fast-forwarded",
            ReconcileOutcome::AheadSkipped => "ahead, skipped",
            ReconcileOutcome::DivergedSkipped => "diverged, skipped",
        };
        f.write_str(label)
    }
}
