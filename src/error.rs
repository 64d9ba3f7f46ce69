use std::path::PathBuf;

use thiserror::Error;

use crate::model::{CommitId, RepoPath};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A declared commit or revision does not exist in the repository.
    #[error("cannot resolve '{rev}' in {repo}")]
    Resolution { repo: PathBuf, rev: String },

    /// A transfer unit or artifact is missing an expected component.
    #[error("malformed artifact {path}: {reason}")]
    MalformedArtifact { path: PathBuf, reason: String },

    /// The active branch could not be fast-forwarded while divergence checks were on.
    #[error(
        "unable to fast-forward active branch '{branch}' in {repo} (local {local}, incoming {incoming})"
    )]
    UnableToFastForward {
        repo: PathBuf,
        branch: String,
        local: CommitId,
        incoming: CommitId,
    },

    #[error("artifact already contains a unit for '{0}'")]
    DuplicateUnit(RepoPath),

    #[error(
        "invalid commit range '{0}': expected [baseline]..[target]; baseline and target are \
         optional but the dots are required to tell them apart"
    )]
    InvalidRange(String),

    #[error("`{command}` failed in {repo}: {stderr}")]
    Git {
        repo: PathBuf,
        command: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MalformedArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
