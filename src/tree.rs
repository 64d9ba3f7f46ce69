//! Sub-repository discovery and snapshot comparison.

mod snapshot;
mod walker;

pub use snapshot::{diff, SnapshotDiff};
pub use walker::walk;
