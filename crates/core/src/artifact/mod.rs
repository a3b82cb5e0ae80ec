//! On-disk artifact storage, keyed by document identity and stage.

mod store;

pub use store::{ArtifactError, ArtifactStore};
