//! File system artifact store with atomic writes.
//!
//! Artifacts live under the work dir in the country-scoped layout:
//!
//! ```text
//! {work}/{output_folder}/pdfs/{stem}.pdf           download
//! {work}/{output_folder}/extracted/{stem}.json     extract
//! {work}/{output_folder}/transformed/{stem}.json   transform
//! ```
//!
//! Writes go to a temp file in the destination directory followed by a
//! rename, so a partially written artifact is never observable at its
//! final path. Existence checks here are a secondary consistency check;
//! the ledger decides what runs.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::ledger::StageName;
use crate::manifest::DocumentDescriptor;

/// Errors from artifact storage.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {path}")]
    NotFound { path: PathBuf },

    #[error("artifact I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Maps document identity to per-stage byte artifacts on disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic final path for a document's stage artifact.
    pub fn path_for(&self, descriptor: &DocumentDescriptor, stage: StageName) -> PathBuf {
        let (dir, ext) = match stage {
            StageName::Download => ("pdfs", "pdf"),
            StageName::Extract => ("extracted", "json"),
            StageName::Transform => ("transformed", "json"),
        };
        self.root
            .join(descriptor.output_dir())
            .join(dir)
            .join(format!("{}.{}", descriptor.file_stem(), ext))
    }

    /// Store a stage artifact atomically and return its final path.
    pub async fn put(
        &self,
        descriptor: &DocumentDescriptor,
        stage: StageName,
        bytes: &[u8],
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(descriptor, stage);
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;

        // Temp file in the destination directory; renaming across
        // filesystems would not be atomic.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let tmp = dir.join(format!(".{}.{}.tmp", descriptor.doc_id(), file_name));

        fs::write(&tmp, bytes).await.map_err(|source| ArtifactError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).await.map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(
            "Stored {} artifact for {} at {} ({} bytes)",
            stage,
            descriptor.doc_id(),
            path.display(),
            bytes.len()
        );
        Ok(path)
    }

    /// Read a stage artifact back.
    pub async fn get(
        &self,
        descriptor: &DocumentDescriptor,
        stage: StageName,
    ) -> Result<Vec<u8>, ArtifactError> {
        let path = self.path_for(descriptor, stage);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound { path })
            }
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    /// Whether the final artifact path exists. Secondary integrity check
    /// only, never the resume decision.
    pub async fn exists(&self, descriptor: &DocumentDescriptor, stage: StageName) -> bool {
        fs::try_exists(self.path_for(descriptor, stage))
            .await
            .unwrap_or(false)
    }
}
