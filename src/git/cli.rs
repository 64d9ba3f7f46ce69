use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{Error, Result};
use crate::model::{CommitId, RevRange, SubRepoPointer};

use super::capability::{RepoHandle, Vcs};

/// [`Vcs`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
}

impl GitCli {
    pub fn new<P: AsRef<Path>>(git: P) -> Self {
        GitCli {
            git: git.as_ref().to_path_buf(),
        }
    }

    fn command<I, S>(&self, dir: &Path, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git);
        cmd.current_dir(dir).args(args);
        cmd
    }

    fn run<I, S>(&self, repo: &RepoHandle, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(repo.workdir(), args);
        tracing::debug!("running {:?} in {:?}", cmd, repo.workdir());
        Ok(cmd.output()?)
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    fn checked<I, S>(&self, repo: &RepoHandle, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        let output = self.run(repo, &args)?;
        if !output.status.success() {
            return Err(git_error(repo.workdir(), &args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn git_error(dir: &Path, args: &[OsString], output: &Output) -> Error {
    let command = std::iter::once("git".to_string())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");
    Error::Git {
        repo: dir.to_path_buf(),
        command,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Parse `git ls-tree -r -z` output, keeping only gitlink entries.
fn parse_ls_tree(raw: &[u8]) -> Vec<SubRepoPointer> {
    raw.split(|b| *b == 0)
        .filter_map(|record| {
            let record = String::from_utf8_lossy(record);
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            let _mode = fields.next()?;
            let kind = fields.next()?;
            let hash = fields.next()?;
            (kind == "commit").then(|| SubRepoPointer {
                path: path.to_string(),
                commit: CommitId::new(hash),
            })
        })
        .collect()
}

/// Parse `git bundle list-heads` output: `<hash> <refname>` per line.
fn parse_list_heads(raw: &str) -> Vec<(CommitId, String)> {
    raw.lines()
        .filter_map(|line| {
            let (hash, name) = line.trim().split_once(' ')?;
            Some((CommitId::new(hash), name.trim().to_string()))
        })
        .collect()
}

impl GitCli {
    fn seed_from_bundle(&self, bundle: &Path, dest: &RepoHandle) -> Result<()> {
        let refs = self.read_bundle_refs(dest, bundle)?;
        self.import_bundle_objects(dest, bundle)?;
        let Some(head) = refs.iter().find(|(_, name)| name == "HEAD").map(|(c, _)| c) else {
            return Ok(());
        };
        let branch = refs.iter().find_map(|(commit, name)| {
            name.strip_prefix("refs/heads/")
                .filter(|_| commit == head)
        });
        match branch {
            Some(branch) => {
                self.checked(dest, ["checkout", "--quiet", "-B", branch, head.as_str()])?;
            }
            None => self.checkout_detached(dest, head)?,
        }
        Ok(())
    }
}

impl Vcs for GitCli {
    fn list_subrepo_pointers(
        &self,
        repo: &RepoHandle,
        commit: &CommitId,
    ) -> Result<Vec<SubRepoPointer>> {
        let output = self.run(repo, ["ls-tree", "-r", "-z", commit.as_str()])?;
        if !output.status.success() {
            return Err(Error::Resolution {
                repo: repo.workdir().to_path_buf(),
                rev: commit.to_string(),
            });
        }
        Ok(parse_ls_tree(&output.stdout))
    }

    fn resolve_commit(&self, repo: &RepoHandle, rev: &str) -> Result<CommitId> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.run(repo, ["rev-parse", "--verify", "--quiet", spec.as_str()])?;
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || hash.is_empty() {
            return Err(Error::Resolution {
                repo: repo.workdir().to_path_buf(),
                rev: rev.to_string(),
            });
        }
        Ok(CommitId::new(hash))
    }

    fn is_ancestor(
        &self,
        repo: &RepoHandle,
        candidate: &CommitId,
        descendant: &CommitId,
    ) -> Result<bool> {
        let args = [
            "merge-base",
            "--is-ancestor",
            candidate.as_str(),
            descendant.as_str(),
        ];
        let output = self.run(repo, args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(git_error(
                repo.workdir(),
                &args.map(OsString::from),
                &output,
            )),
        }
    }

    fn resolve_branch_tip(&self, repo: &RepoHandle, name: &str) -> Result<Option<CommitId>> {
        let refname = format!("refs/heads/{}", name);
        let output = self.run(repo, ["rev-parse", "--verify", "--quiet", refname.as_str()])?;
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !hash.is_empty() {
            Ok(Some(CommitId::new(hash)))
        } else {
            Ok(None)
        }
    }

    fn current_branch(&self, repo: &RepoHandle) -> Result<Option<String>> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = self.run(repo, args)?;
        match output.status.code() {
            Some(0) => Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            Some(1) => Ok(None),
            _ => Err(git_error(
                repo.workdir(),
                &args.map(OsString::from),
                &output,
            )),
        }
    }

    fn list_branches(&self, repo: &RepoHandle) -> Result<Vec<(String, CommitId)>> {
        let out = self.checked(
            repo,
            [
                "for-each-ref",
                "--format=%(objectname) %(refname:short)",
                "refs/heads/",
            ],
        )?;
        Ok(parse_list_heads(&out)
            .into_iter()
            .map(|(commit, name)| (name, commit))
            .collect())
    }

    fn create_or_move_branch(
        &self,
        repo: &RepoHandle,
        name: &str,
        commit: &CommitId,
    ) -> Result<()> {
        self.checked(repo, ["branch", "--quiet", "-f", name, commit.as_str()])?;
        Ok(())
    }

    fn delete_branch(&self, repo: &RepoHandle, name: &str) -> Result<()> {
        self.checked(repo, ["branch", "--quiet", "-D", name])?;
        Ok(())
    }

    fn reset_active_to(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()> {
        let head = self.run(repo, ["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if head.status.success() {
            // --keep refuses to overwrite uncommitted changes instead of discarding them.
            self.checked(repo, ["reset", "--quiet", "--keep", commit.as_str()])?;
            return Ok(());
        }
        // Unborn branch: there is nothing to keep, so check the commit out onto it.
        let branch = self.current_branch(repo)?.ok_or_else(|| Error::Resolution {
            repo: repo.workdir().to_path_buf(),
            rev: "HEAD".to_string(),
        })?;
        self.checked(
            repo,
            ["checkout", "--quiet", "-B", branch.as_str(), commit.as_str()],
        )?;
        Ok(())
    }

    fn checkout_detached(&self, repo: &RepoHandle, commit: &CommitId) -> Result<()> {
        self.checked(repo, ["checkout", "--quiet", "--detach", commit.as_str()])?;
        Ok(())
    }

    fn create_bundle(&self, repo: &RepoHandle, output: &Path, range: &RevRange) -> Result<()> {
        let mut args = vec![
            "bundle".into(),
            "create".into(),
            "--quiet".into(),
            output.as_os_str().to_os_string(),
        ];
        if let Some(exclude) = &range.exclude {
            args.push(format!("^{}", exclude).into());
        }
        args.extend(range.include.iter().map(Into::into));
        self.checked(repo, &args)?;
        Ok(())
    }

    fn read_bundle_refs(
        &self,
        repo: &RepoHandle,
        bundle: &Path,
    ) -> Result<Vec<(CommitId, String)>> {
        if !bundle.is_file() {
            return Err(Error::malformed(bundle, "bundle file is missing"));
        }
        let output = self.run(repo, [OsStr::new("bundle"), OsStr::new("list-heads"), bundle.as_os_str()])?;
        if !output.status.success() {
            return Err(Error::malformed(
                bundle,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_list_heads(&String::from_utf8_lossy(&output.stdout)))
    }

    fn import_bundle_objects(&self, repo: &RepoHandle, bundle: &Path) -> Result<()> {
        self.checked(repo, [OsStr::new("bundle"), OsStr::new("unbundle"), bundle.as_os_str()])?;
        Ok(())
    }

    fn clone_from_bundle(&self, bundle: &Path, dest: &RepoHandle) -> Result<()> {
        // `git clone` would keep every other bundle ref, disposable aliases
        // included, as remote-tracking refs. Seeding an empty repository
        // writes no refs beyond the one HEAD names.
        std::fs::create_dir_all(dest.workdir())?;
        self.checked(dest, ["init", "--quiet"])?;
        let seeded = self.seed_from_bundle(bundle, dest);
        if seeded.is_err() {
            if let Err(e) = std::fs::remove_dir_all(dest.workdir().join(".git")) {
                tracing::warn!("could not remove partial clone in {:?}: {}", dest.workdir(), e);
            }
        }
        seeded
    }

    fn repo_exists(&self, repo: &RepoHandle) -> bool {
        repo.workdir().join(".git").exists()
    }
}
