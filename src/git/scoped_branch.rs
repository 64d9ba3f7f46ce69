use crate::error::Result;
use crate::model::CommitId;

use super::capability::{RepoHandle, Vcs};

/// A disposable branch pointing at a commit that has no other name.
///
/// A bundle only carries commits reachable from the refs it records, so
/// a bare commit needs an alias for the duration of the bundle call. The
/// branch is deleted when the guard drops, on success and on error alike.
pub struct ScopedBranch<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    repo: RepoHandle,
    name: String,
}

impl<'a, V: Vcs + ?Sized> ScopedBranch<'a, V> {
    pub fn create(vcs: &'a V, repo: &RepoHandle, prefix: &str, commit: &CommitId) -> Result<Self> {
        let name = format!("{}{}", prefix, uuid::Uuid::new_v4().simple());
        vcs.create_or_move_branch(repo, &name, commit)?;
        tracing::debug!("created disposable branch {} at {} in {:?}", name, commit, repo.workdir());
        Ok(ScopedBranch {
            vcs,
            repo: repo.clone(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V: Vcs + ?Sized> Drop for ScopedBranch<'_, V> {
    fn drop(&mut self) {
        if let Err(e) = self.vcs.delete_branch(&self.repo, &self.name) {
            tracing::warn!(
                "failed to delete disposable branch {} in {:?}: {}",
                self.name,
                self.repo.workdir(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeVcs;

    #[test]
    fn test_branch_is_removed_on_drop() {
        let vcs = FakeVcs::new();
        let repo = vcs.repo("/root");
        vcs.commit(&repo, "c1", &[], &[]);

        {
            let alias = ScopedBranch::create(&vcs, &repo, "tmp-", &CommitId::from("c1")).unwrap();
            assert!(alias.name().starts_with("tmp-"));
            assert_eq!(
                vcs.resolve_branch_tip(&repo, alias.name()).unwrap(),
                Some(CommitId::from("c1"))
            );
        }

        assert!(vcs.branch_names(&repo).iter().all(|b| !b.starts_with("tmp-")));
    }

    #[test]
    fn test_branch_is_removed_when_work_fails() {
        let vcs = FakeVcs::new();
        let repo = vcs.repo("/root");
        vcs.commit(&repo, "c1", &[], &[]);

        let attempt = || -> Result<()> {
            let _alias = ScopedBranch::create(&vcs, &repo, "tmp-", &CommitId::from("c1"))?;
            vcs.resolve_commit(&repo, "missing")?;
            Ok(())
        };
        assert!(attempt().is_err());
        assert!(vcs.branch_names(&repo).is_empty());
    }
}
