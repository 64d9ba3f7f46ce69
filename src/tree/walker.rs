use crate::error::Result;
use crate::git::{RepoHandle, Vcs};
use crate::model::{CommitId, RepoNode, RepoPath, SubRepoPointer};

/// Lazily walk every sub-repository reachable from `commit` in `root`.
///
/// Nodes come out depth-first, each parent immediately before its
/// descendants. A child is listed at the commit its parent's pointer
/// records, not at whatever the child has checked out. Calling `walk` again
/// with the same arguments reproduces the same sequence.
pub fn walk<'a, V: Vcs + ?Sized>(
    vcs: &'a V,
    root: &RepoHandle,
    commit: &CommitId,
) -> TreeWalk<'a, V> {
    TreeWalk {
        vcs,
        stack: Vec::new(),
        descend: Some((root.clone(), RepoPath::root(), commit.clone())),
        failed: false,
    }
}

struct Frame {
    repo: RepoHandle,
    prefix: RepoPath,
    pointers: std::vec::IntoIter<SubRepoPointer>,
}

/// Iterator returned by [`walk`].
///
/// The children of a node are listed on the call *after* the node is
/// yielded, so a caller may materialize the node's repository in between,
/// or call [`TreeWalk::skip_current_dir`] to prune it.
pub struct TreeWalk<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    stack: Vec<Frame>,
    descend: Option<(RepoHandle, RepoPath, CommitId)>,
    failed: bool,
}

impl<V: Vcs + ?Sized> TreeWalk<'_, V> {
    /// Do not descend into the node most recently yielded.
    pub fn skip_current_dir(&mut self) {
        self.descend = None;
    }
}

impl<V: Vcs + ?Sized> Iterator for TreeWalk<'_, V> {
    type Item = Result<RepoNode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some((repo, prefix, commit)) = self.descend.take() {
            match self.vcs.list_subrepo_pointers(&repo, &commit) {
                Ok(pointers) => self.stack.push(Frame {
                    repo,
                    prefix,
                    pointers: pointers.into_iter(),
                }),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        loop {
            let frame = self.stack.last_mut()?;
            let Some(pointer) = frame.pointers.next() else {
                self.stack.pop();
                continue;
            };
            let path = frame.prefix.join(&pointer.path);
            self.descend = Some((
                frame.repo.child(&pointer.path),
                path.clone(),
                pointer.commit.clone(),
            ));
            return Some(Ok(RepoNode {
                path,
                commit: pointer.commit,
            }));
        }
    }
}
