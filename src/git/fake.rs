//! In-memory [`Vcs`] for tests: commits with parents and sub-repository
//! pointers, branches, HEAD, and bundle files serialized as YAML.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{CommitId, RevRange, SubRepoPointer};

use super::capability::{RepoHandle, Vcs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeCommit {
    pub parents: Vec<CommitId>,
    pub subrepos: Vec<SubRepoPointer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeHead {
    Branch(String),
    Detached(CommitId),
    Unborn,
}

#[derive(Debug, Clone)]
struct FakeRepo {
    commits: BTreeMap<CommitId, FakeCommit>,
    branches: BTreeMap<String, CommitId>,
    head: FakeHead,
    ops: Vec<String>,
}

impl FakeRepo {
    fn empty() -> Self {
        FakeRepo {
            commits: BTreeMap::new(),
            branches: BTreeMap::new(),
            head: FakeHead::Unborn,
            ops: Vec::new(),
        }
    }

    fn head_commit(&self) -> Option<CommitId> {
        match &self.head {
            FakeHead::Branch(name) => self.branches.get(name).cloned(),
            FakeHead::Detached(commit) => Some(commit.clone()),
            FakeHead::Unborn => None,
        }
    }

    fn resolve(&self, rev: &str) -> Option<CommitId> {
        if rev == "HEAD" {
            return self.head_commit();
        }
        if let Some(tip) = self.branches.get(rev) {
            return Some(tip.clone());
        }
        let id = CommitId::from(rev);
        self.commits.contains_key(&id).then_some(id)
    }

    fn reachable(&self, from: &CommitId) -> BTreeSet<CommitId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([from.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&id) {
                queue.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FakeBundle {
    prerequisite: Option<CommitId>,
    refs: Vec<(CommitId, String)>,
    commits: BTreeMap<CommitId, FakeCommit>,
}

#[derive(Debug, Default)]
pub struct FakeVcs {
    repos: RefCell<BTreeMap<PathBuf, FakeRepo>>,
    fail_branch_updates: RefCell<usize>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty repository at `path`.
    pub fn repo<P: AsRef<Path>>(&self, path: P) -> RepoHandle {
        let handle = RepoHandle::new(path);
        self.repos
            .borrow_mut()
            .entry(handle.workdir().to_path_buf())
            .or_insert_with(FakeRepo::empty);
        handle
    }

    pub fn commit(&self, repo: &RepoHandle, id: &str, parents: &[&str], subrepos: &[(&str, &str)]) {
        self.with_repo_mut(repo, |r| {
            r.commits.insert(
                CommitId::from(id),
                FakeCommit {
                    parents: parents.iter().map(|p| CommitId::from(*p)).collect(),
                    subrepos: subrepos
                        .iter()
                        .map(|(path, commit)| SubRepoPointer {
                            path: path.to_string(),
                            commit: CommitId::from(*commit),
                        })
                        .collect(),
                },
            );
        });
    }

    pub fn set_branch(&self, repo: &RepoHandle, name: &str, commit: &str) {
        self.with_repo_mut(repo, |r| {
            r.branches.insert(name.to_string(), CommitId::from(commit));
        });
    }

    pub fn set_head(&self, repo: &RepoHandle, head: FakeHead) {
        self.with_repo_mut(repo, |r| r.head = head);
    }

    pub fn head(&self, repo: &RepoHandle) -> FakeHead {
        self.with_repo(repo, |r| r.head.clone())
    }

    pub fn head_commit(&self, repo: &RepoHandle) -> Option<CommitId> {
        self.with_repo(repo, |r| r.head_commit())
    }

    pub fn branch_names(&self, repo: &RepoHandle) -> Vec<String> {
        self.with_repo(repo, |r| r.branches.keys().cloned().collect())
    }

    pub fn has_commit(&self, repo: &RepoHandle, id: &str) -> bool {
        self.with_repo(repo, |r| r.commits.contains_key(&CommitId::from(id)))
    }

    /// Make the next `count` calls to `create_or_move_branch` fail.
    pub fn fail_branch_updates(&self, count: usize) {
        *self.fail_branch_updates.borrow_mut() = count;
    }

    /// Mutating calls made against `repo`, in order.
    pub fn ops(&self, repo: &RepoHandle) -> Vec<String> {
        self.with_repo(repo, |r| r.ops.clone())
    }

    fn with_repo<T>(&self, repo: &RepoHandle, f: impl FnOnce(&FakeRepo) -> T) -> T {
        let repos = self.repos.borrow();
        let r = repos
            .get(repo.workdir())
            .unwrap_or_else(|| panic!("no fake repo at {:?}", repo.workdir()));
        f(r)
    }

    fn with_repo_mut<T>(&self, repo: &RepoHandle, f: impl FnOnce(&mut FakeRepo) -> T) -> T {
        let mut repos = self.repos.borrow_mut();
        let r = repos
            .get_mut(repo.workdir())
            .unwrap_or_else(|| panic!("no fake repo at {:?}", repo.workdir()));
        f(r)
    }

    fn try_repo<T>(&self, repo: &RepoHandle, f: impl FnOnce(&mut FakeRepo) -> Result<T>) -> Result<T> {
        let mut repos = self.repos.borrow_mut();
        match repos.get_mut(repo.workdir()) {
            Some(r) => f(r),
            None => Err(git_failure(repo, "not a git repository")),
        }
    }

    fn read_bundle(path: &Path) -> Result<FakeBundle> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::malformed(path, e.to_string()))?;
        serde_yaml::from_str(&content).map_err(|e| Error::malformed(path, e.to_string()))
    }
}

fn git_failure(repo: &RepoHandle, stderr: &str) -> Error {
    Error::Git {
        repo: repo.workdir().to_path_buf(),
        command: "fake".to_string(),
        stderr: stderr.to_string(),
    }
}

fn resolution(repo: &RepoHandle, rev: &str) -> Error {
    Error::Resolution {
        repo: repo.workdir().to_path_buf(),
        rev: rev.to_string(),
    }
}

impl Vcs for FakeVcs {
    fn list_subrepo_pointers(
        &self,
        repo: &RepoHandle,
        commit: &CommitId,
    ) -> Result<Vec<SubRepoPointer>> {
        self.try_repo(repo, |r| {
            r.commits
                .get(commit)
                .map(|c| c.subrepos.clone())
                .ok_or_else(|| resolution(repo, commit.as_str()))
        })
        .map_err(|_| resolution(repo, commit.as_str()))
    }

    fn resolve_commit(&self, repo: &RepoHandle, rev: &str) -> Result<CommitId> {
        self.try_repo(repo, |r| r.resolve(rev).ok_or_else(|| resolution(repo, rev)))
    }

    fn is_ancestor(
        &self,
        repo: &RepoHandle,
        candidate: &CommitId,
        descendant: &CommitId,
    ) -> Result<bool> {
        self.try_repo(repo, |r| Ok(r.reachable(descendant).contains(candidate)))
    }

    fn resolve_branch_tip(&self, repo: &RepoHandle, name: &str) -> Result<Option<CommitId>> {
        self.try_repo(repo, |r| Ok(r.branches.get(name).cloned()))
    }

    fn current_branch(&self, repo: &RepoHandle) -> Result<Option<String>> {
        self.try_repo(repo, |r| match &r.head {
            FakeHead::Branch(name) => Ok(Some(name.clone())),
            _ => Ok(None),
        })
    }

    fn list_branches(&self, repo: &RepoHandle) -> Result<Vec<(String, CommitId)>> {
        self.try_repo(repo, |r| {
            Ok(r.branches
                .iter()
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect())
        })
    }

    fn create_or_move_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        commit: &CommitId,
    ) -> Result<()> {
        {
            let mut pending = self.fail_branch_updates.borrow_mut();
            if *pending > 0 {
                *pending -= 1;
                return Err(git_failure(repo, "cannot lock ref"));
            }
        }
        self.try_repo(repo, |r| {
            if !r.commits.contains_key(commit) {
                return Err(resolution(repo, commit.as_str()));
            }
            r.branches.insert(name.to_string(), commit.clone());
            r.ops.push(format!("branch {} {}", name, commit));
            Ok(())
        })
    }

    fn delete_branch(&self, repo: &RepoHandle, name: &str) -> Result<()> {
        self.try_repo(repo, |r| {
            if r.head == FakeHead::Branch(name.to_string()) {
                return Err(git_failure(repo, "cannot delete the checked-out branch"));
            }
            r.branches
                .remove(name)
                .ok_or_else(|| git_failure(repo, "branch not found"))?;
            r.ops.push(format!("delete {}", name));
            Ok(())
        })
    }

    fn reset_active_to(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()> {
        self.try_repo(repo, |r| {
            let FakeHead::Branch(name) = r.head.clone() else {
                return Err(git_failure(repo, "HEAD is detached"));
            };
            r.branches.insert(name.clone(), commit.clone());
            r.ops.push(format!("reset {} {}", name, commit));
            Ok(())
        })
    }

    fn checkout_detached(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()> {
        self.try_repo(repo, |r| {
            if !r.commits.contains_key(commit) {
                return Err(resolution(repo, commit.as_str()));
            }
            r.head = FakeHead::Detached(commit.clone());
            r.ops.push(format!("detach {}", commit));
            Ok(())
        })
    }

    fn create_bundle(&self, repo: &RepoHandle, output: &Path, range: &RevRange) -> Result<()> {
        let bundle = self.try_repo(repo, |r| {
            let excluded = match &range.exclude {
                Some(base) => r.reachable(base),
                None => BTreeSet::new(),
            };
            let mut refs = Vec::new();
            let mut commits = BTreeMap::new();
            for name in &range.include {
                let tip = r.resolve(name).ok_or_else(|| resolution(repo, name))?;
                let refname = if name == "HEAD" {
                    name.clone()
                } else {
                    format!("refs/heads/{}", name)
                };
                refs.push((tip.clone(), refname));
                for id in r.reachable(&tip).difference(&excluded) {
                    if let Some(commit) = r.commits.get(id) {
                        commits.insert(id.clone(), commit.clone());
                    }
                }
            }
            if commits.is_empty() {
                return Err(git_failure(repo, "refusing to create empty bundle"));
            }
            Ok(FakeBundle {
                prerequisite: range.exclude.clone(),
                refs,
                commits,
            })
        })?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, serde_yaml::to_string(&bundle)?)?;
        Ok(())
    }

    fn read_bundle_refs(
        &self,
        _repo: &RepoHandle,
        bundle: &Path,
    ) -> Result<Vec<(CommitId, String)>> {
        Ok(Self::read_bundle(bundle)?.refs)
    }

    fn import_bundle_objects(&self, repo: &RepoHandle, bundle: &Path) -> Result<()> {
        let bundle = Self::read_bundle(bundle)?;
        self.try_repo(repo, |r| {
            if let Some(pre) = &bundle.prerequisite {
                if !r.commits.contains_key(pre) {
                    return Err(git_failure(repo, "repository lacks prerequisite commits"));
                }
            }
            r.commits.extend(bundle.commits);
            Ok(())
        })
    }

    fn clone_from_bundle(&self, bundle: &Path, dest: &RepoHandle) -> Result<()> {
        let bundle = Self::read_bundle(bundle)?;
        if bundle.prerequisite.is_some() {
            return Err(git_failure(dest, "repository lacks prerequisite commits"));
        }
        let mut repo = FakeRepo::empty();
        repo.commits = bundle.commits;
        // Only the branch HEAD names becomes local; the rest of the refs
        // are left for the reconciler.
        if let Some((head, _)) = bundle.refs.iter().find(|(_, name)| name == "HEAD") {
            let branch = bundle.refs.iter().find_map(|(commit, name)| {
                name.strip_prefix("refs/heads/").filter(|_| commit == head)
            });
            repo.head = match branch {
                Some(branch) => {
                    repo.branches.insert(branch.to_string(), head.clone());
                    FakeHead::Branch(branch.to_string())
                }
                None => FakeHead::Detached(head.clone()),
            };
        }
        let mut repos = self.repos.borrow_mut();
        if repos.contains_key(dest.workdir()) {
            return Err(git_failure(dest, "destination already exists"));
        }
        repos.insert(dest.workdir().to_path_buf(), repo);
        Ok(())
    }

    fn repo_exists(&self, repo: &RepoHandle) -> bool {
        self.repos.borrow().contains_key(repo.workdir())
    }
}
