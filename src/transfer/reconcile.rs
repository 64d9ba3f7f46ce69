//! Fast-forward reconciliation of one transfer unit into a live repository.

use std::path::Path;

use crate::error::{Error, Result};
use crate::git::{RepoHandle, Vcs};
use crate::model::{BranchRef, CommitId, ReconcileOutcome, UnitManifest};

/// How a local branch tip relates to an incoming commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub exists: bool,
    pub equal: bool,
    /// `is_ancestor(local, incoming)`
    pub local_precedes: bool,
    /// `is_ancestor(incoming, local)`
    pub incoming_precedes: bool,
}

impl Relation {
    /// Query only the ancestry facts the decision table needs.
    pub fn query<V: Vcs + ?Sized>(
        vcs: &V,
        repo: &RepoHandle,
        local: Option<&CommitId>,
        incoming: &CommitId,
    ) -> Result<Self> {
        let Some(local) = local else {
            return Ok(Relation {
                exists: false,
                equal: false,
                local_precedes: false,
                incoming_precedes: false,
            });
        };
        if local == incoming {
            return Ok(Relation {
                exists: true,
                equal: true,
                local_precedes: true,
                incoming_precedes: true,
            });
        }
        let local_precedes = vcs.is_ancestor(repo, local, incoming)?;
        let incoming_precedes = !local_precedes && vcs.is_ancestor(repo, incoming, local)?;
        Ok(Relation {
            exists: true,
            equal: false,
            local_precedes,
            incoming_precedes,
        })
    }

    pub fn outcome(self) -> ReconcileOutcome {
        use ReconcileOutcome::*;
        match (
            self.exists,
            self.equal,
            self.local_precedes,
            self.incoming_precedes,
        ) {
            (false, _, _, _) => Created,
            (true, true, _, _) => UpToDate,
            (true, false, true, _) => FastForwarded,
            (true, false, false, true) => AheadSkipped,
            (true, false, false, false) => DivergedSkipped,
        }
    }
}

/// Decode the refs a bundle declares. `HEAD` becomes the incoming head;
/// a disposable alias left by the producer stands in for `HEAD` when there
/// is none; other non-branch refs are ignored.
pub fn read_unit_manifest<V: Vcs + ?Sized>(
    vcs: &V,
    repo: &RepoHandle,
    bundle: &Path,
    alias_prefix: &str,
) -> Result<UnitManifest> {
    let mut manifest = UnitManifest::default();
    let mut alias_head = None;
    for (commit, refname) in vcs.read_bundle_refs(repo, bundle)? {
        if refname == "HEAD" {
            manifest.incoming_head = Some(commit);
        } else if let Some(branch) = refname.strip_prefix("refs/heads/") {
            if branch.starts_with(alias_prefix) {
                alias_head = Some(commit);
            } else {
                manifest.branches.push(BranchRef {
                    name: branch.to_string(),
                    incoming_commit: commit,
                });
            }
        } else {
            tracing::debug!("ignoring {} in {:?}", refname, bundle);
        }
    }
    if manifest.incoming_head.is_none() {
        manifest.incoming_head = alias_head;
    }
    Ok(manifest)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub name: String,
    pub local: Option<CommitId>,
    pub incoming: CommitId,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadAction {
    /// The unit declared no head.
    None,
    /// The working state was already at the incoming head.
    AlreadyThere(CommitId),
    Detached(CommitId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub branches: Vec<BranchReport>,
    pub head: HeadAction,
}

/// Applies transfer units to repositories, one branch at a time.
pub struct Reconciler<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    check_divergence: bool,
    alias_prefix: String,
}

impl<'a, V: Vcs + ?Sized> Reconciler<'a, V> {
    pub fn new(vcs: &'a V, alias_prefix: &str) -> Self {
        Reconciler {
            vcs,
            check_divergence: false,
            alias_prefix: alias_prefix.to_string(),
        }
    }

    /// Fail instead of warn when the active branch cannot be fast-forwarded.
    pub fn check_divergence(mut self, enabled: bool) -> Self {
        self.check_divergence = enabled;
        self
    }

    pub fn apply(&self, repo: &RepoHandle, bundle: &Path) -> Result<ReconcileReport> {
        let manifest = read_unit_manifest(self.vcs, repo, bundle, &self.alias_prefix)?;
        self.vcs.import_bundle_objects(repo, bundle)?;

        let active = self.vcs.current_branch(repo)?;
        let mut branches = Vec::with_capacity(manifest.branches.len());
        for branch in &manifest.branches {
            let is_active = active.as_deref() == Some(branch.name.as_str());
            branches.push(self.reconcile_branch(repo, branch, is_active)?);
        }

        let head = match manifest.incoming_head {
            None => HeadAction::None,
            Some(head) => self.settle_head(repo, active.as_deref(), head)?,
        };
        Ok(ReconcileReport { branches, head })
    }

    fn reconcile_branch(
        &self,
        repo: &RepoHandle,
        branch: &BranchRef,
        is_active: bool,
    ) -> Result<BranchReport> {
        let name = branch.name.as_str();
        let incoming = &branch.incoming_commit;
        let local = self.vcs.resolve_branch_tip(repo, name)?;
        let outcome = Relation::query(self.vcs, repo, local.as_ref(), incoming)?.outcome();
        let dir = repo.workdir();

        match outcome {
            ReconcileOutcome::Created => {
                if is_active {
                    // Checked out but unborn: populate the working tree too.
                    self.vcs.reset_active_to(repo, incoming)?;
                } else {
                    self.vcs.create_or_move_branch(repo, name, incoming)?;
                }
                tracing::info!("{:?}: created branch {} at {}", dir, name, incoming);
            }
            ReconcileOutcome::UpToDate => {
                tracing::info!("{:?}: {} already at {}", dir, name, incoming);
            }
            ReconcileOutcome::FastForwarded => {
                if is_active {
                    self.vcs.reset_active_to(repo, incoming)?;
                } else {
                    self.recreate_branch(repo, name, local.as_ref(), incoming)?;
                }
                tracing::info!(
                    "{:?}: fast-forwarded {} from {} to {}",
                    dir,
                    name,
                    display_opt(&local),
                    incoming
                );
            }
            ReconcileOutcome::AheadSkipped => {
                tracing::warn!(
                    "{:?}: {} at {} already contains {}, skipping",
                    dir,
                    name,
                    display_opt(&local),
                    incoming
                );
            }
            ReconcileOutcome::DivergedSkipped => {
                tracing::warn!(
                    "{:?}: {} at {} has diverged from {}; merge or rebase it manually, then apply again",
                    dir,
                    name,
                    display_opt(&local),
                    incoming
                );
            }
        }

        if self.check_divergence && is_active && outcome.is_skip() {
            if let Some(local) = &local {
                return Err(Error::UnableToFastForward {
                    repo: dir.to_path_buf(),
                    branch: name.to_string(),
                    local: local.clone(),
                    incoming: incoming.clone(),
                });
            }
        }

        Ok(BranchReport {
            name: name.to_string(),
            local,
            incoming: incoming.clone(),
            outcome,
        })
    }

    /// Delete `name` and create it again at `incoming`. The old tip is put
    /// back if the second step fails.
    fn recreate_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        local: Option<&CommitId>,
        incoming: &CommitId,
    ) -> Result<()> {
        self.vcs.resolve_commit(repo, incoming.as_str())?;
        self.vcs.delete_branch(repo, name)?;
        let created = self.vcs.create_or_move_branch(repo, name, incoming);
        if created.is_err() {
            if let Some(local) = local {
                if let Err(e) = self.vcs.create_or_move_branch(repo, name, local) {
                    tracing::warn!(
                        "{:?}: could not restore {} at {}: {}",
                        repo.workdir(),
                        name,
                        local,
                        e
                    );
                }
            }
        }
        created
    }

    fn settle_head(&self, repo: &RepoHandle, active: Option<&str>, head: CommitId) -> Result<HeadAction> {
        let current = match active {
            Some(name) => self.vcs.resolve_branch_tip(repo, name)?,
            None => self.vcs.resolve_commit(repo, "HEAD").ok(),
        };
        if current.as_ref() == Some(&head) {
            return Ok(HeadAction::AlreadyThere(head));
        }
        self.vcs.checkout_detached(repo, &head)?;
        tracing::info!("{:?}: checked out {} (detached)", repo.workdir(), head);
        Ok(HeadAction::Detached(head))
    }
}

fn display_opt(commit: &Option<CommitId>) -> String {
    commit
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "(none)".to_string())
}
