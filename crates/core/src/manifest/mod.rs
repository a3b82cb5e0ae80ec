//! Batch manifest: the input list of documents to process.

mod loader;
mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use loader::{discover_manifest, load_manifest, manifest_path};
pub use types::DocumentDescriptor;

/// Errors loading or resolving a manifest. Fatal to the batch.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest file is not a valid JSON array of documents.
    #[error("failed to parse manifest {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A document entry is missing a mandatory field.
    #[error("manifest document #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// Two entries resolve to the same document id.
    #[error("duplicate document in manifest: {name} ({doc_id})")]
    DuplicateDocument { doc_id: String, name: String },

    /// No manifest at the expected location.
    #[error("manifest not found at {path}")]
    NotFound { path: PathBuf },

    /// The batch country could not be determined.
    #[error("could not determine batch country; pass --country or --manifest")]
    UnknownCountry,
}
