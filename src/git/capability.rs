use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::{CommitId, RevRange, SubRepoPointer};

/// A repository working directory. Capability calls act on the handle they
/// are given, never on the process's current directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoHandle {
    workdir: PathBuf,
}

impl RepoHandle {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        RepoHandle {
            workdir: workdir.as_ref().to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Handle for a sub-repository at `subpath` relative to this one.
    pub fn child(&self, subpath: &str) -> RepoHandle {
        RepoHandle {
            workdir: self.workdir.join(subpath),
        }
    }
}

/// Operations the sync core consumes from the version-control layer.
pub trait Vcs {
    /// Sub-repository pointers recorded in the tree of `commit`.
    fn list_subrepo_pointers(
        &self,
        repo: &RepoHandle,
        commit: &CommitId,
    ) -> Result<Vec<SubRepoPointer>>;

    /// Resolve a revision expression (`HEAD`, branch, hash) to a commit.
    fn resolve_commit(&self, repo: &RepoHandle, rev: &str) -> Result<CommitId>;

    /// True when `candidate` precedes or equals `descendant`.
    fn is_ancestor(
        &self,
        repo: &RepoHandle,
        candidate: &CommitId,
        descendant: &CommitId,
    ) -> Result<bool>;

    fn resolve_branch_tip(&self, repo: &RepoHandle, name: &str) -> Result<Option<CommitId>>;

    /// Name of the checked-out branch, `None` when detached.
    fn current_branch(&self, repo: &RepoHandle) -> Result<Option<String>>;

    /// Local branches and their tips.
    fn list_branches(&self, repo: &RepoHandle) -> Result<Vec<(String, CommitId)>>;

    fn create_or_move_branch(&self, repo: &RepoHandle, name: &str, commit: &CommitId)
        -> Result<()>;

    fn delete_branch(&self, repo: &RepoHandle, name: &str) -> Result<()>;

    /// Move the active branch (and working state) to `commit` in place.
    fn reset_active_to(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()>;

    fn checkout_detached(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()>;

    fn create_bundle(&self, repo: &RepoHandle, output: &Path, range: &RevRange) -> Result<()>;

    /// `(commit, ref name)` pairs declared by a bundle.
    fn read_bundle_refs(&self, repo: &RepoHandle, bundle: &Path)
        -> Result<Vec<(CommitId, String)>>;

    /// Store the bundle's objects without touching any ref.
    fn import_bundle_objects(&self, repo: &RepoHandle, bundle: &Path) -> Result<()>;

    fn clone_from_bundle(&self, bundle: &Path, dest: &RepoHandle) -> Result<()>;

    fn repo_exists(&self, repo: &RepoHandle) -> bool;
}
