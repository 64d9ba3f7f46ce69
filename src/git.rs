//! Version-control capability layer.
//!
//! Everything the sync core needs from git goes through the [`Vcs`] trait,
//! with the target repository passed explicitly as a [`RepoHandle`].

mod capability;
mod cli;
#[cfg(test)]
pub mod fake;
mod scoped_branch;

pub use capability::{RepoHandle, Vcs};
pub use cli::GitCli;
pub use scoped_branch::ScopedBranch;
