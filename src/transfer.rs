//! Transfer units: producing them from a snapshot diff, packing them into
//! an artifact, and reconciling them into a live repository.

pub mod archive;
pub mod bundler;
pub mod reconcile;

pub use archive::{TransferArtifact, UnpackedArtifact};
pub use bundler::Bundler;
pub use reconcile::{HeadAction, ReconcileReport, Reconciler};
