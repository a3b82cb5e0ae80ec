//! Document descriptor types.

use std::path::PathBuf;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn default_country() -> String {
    "unknown".to_string()
}

fn default_publisher() -> String {
    "unknown".to_string()
}

fn default_section() -> String {
    "GEN".to_string()
}

fn default_document_type() -> String {
    "AIP".to_string()
}

fn default_access() -> String {
    "public".to_string()
}

fn default_language() -> Vec<String> {
    vec!["english".to_string(), "spanish".to_string()]
}

/// Identity and metadata for one document to process.
///
/// Loaded from the batch manifest and immutable afterwards. The derived
/// [`doc_id`](DocumentDescriptor::doc_id) is the key used throughout the
/// ledger and artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Human-readable document name; also the basis of artifact file names.
    pub name: String,
    /// Source URL the raw document is fetched from.
    pub source: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_section")]
    pub section: String,
    #[serde(default = "default_publisher")]
    pub publisher: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default = "default_language")]
    pub language: Vec<String>,
    /// Directory under the work dir that receives this document's
    /// artifacts, e.g. `_AIPs/spain`. Filled in from the country when the
    /// manifest omits it.
    #[serde(default)]
    pub output_folder: String,
}

impl DocumentDescriptor {
    /// Create a descriptor with default metadata. Mostly useful for tests
    /// and ad-hoc single-document runs; batch runs load the manifest.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        let country = country.into();
        Self {
            name: name.into(),
            source: source.into(),
            output_folder: format!("_AIPs/{country}"),
            country,
            section: default_section(),
            publisher: default_publisher(),
            document_type: default_document_type(),
            access: default_access(),
            language: default_language(),
        }
    }

    /// Stable unique identifier: first 12 hex chars of
    /// SHA-256(name, source, country). Deterministic across runs so the
    /// ledger and artifact paths survive restarts.
    pub fn doc_id(&self) -> String {
        let digest = Sha256::digest(format!("{}\n{}\n{}", self.name, self.source, self.country));
        let hex = format!("{digest:x}");
        hex[..12].to_string()
    }

    /// Filesystem-safe stem derived from the document name, with any
    /// trailing `.pdf` stripped.
    pub fn file_stem(&self) -> String {
        let name = self.name.trim();
        let name = name
            .strip_suffix(".pdf")
            .or_else(|| name.strip_suffix(".PDF"))
            .unwrap_or(name);
        // Unlikely to fail; the pattern is a literal character class.
        let stem = match Regex::new(r"[^A-Za-z0-9._-]+") {
            Ok(re) => re.replace_all(name, "_").into_owned(),
            Err(_) => name.replace(' ', "_"),
        };
        let stem = stem.trim_matches('_').to_string();
        if stem.is_empty() {
            format!("document_{}", self.doc_id())
        } else {
            stem
        }
    }

    /// Directory under the work dir that receives this document's artifacts.
    pub fn output_dir(&self) -> PathBuf {
        if self.output_folder.is_empty() {
            PathBuf::from("_AIPs").join(&self.country)
        } else {
            PathBuf::from(&self.output_folder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_is_deterministic() {
        let a = DocumentDescriptor::new("GEN 2.1", "https://aip.example/gen21.pdf", "spain");
        let b = DocumentDescriptor::new("GEN 2.1", "https://aip.example/gen21.pdf", "spain");
        assert_eq!(a.doc_id(), b.doc_id());
        assert_eq!(a.doc_id().len(), 12);
    }

    #[test]
    fn test_doc_id_varies_with_identity_fields() {
        let base = DocumentDescriptor::new("GEN 2.1", "https://aip.example/gen21.pdf", "spain");
        let other_name = DocumentDescriptor::new("GEN 2.2", "https://aip.example/gen21.pdf", "spain");
        let other_country =
            DocumentDescriptor::new("GEN 2.1", "https://aip.example/gen21.pdf", "argentina");
        assert_ne!(base.doc_id(), other_name.doc_id());
        assert_ne!(base.doc_id(), other_country.doc_id());
    }

    #[test]
    fn test_file_stem_sanitization() {
        let doc = DocumentDescriptor::new("GEN 2.1 Measuring System.pdf", "https://x", "spain");
        assert_eq!(doc.file_stem(), "GEN_2.1_Measuring_System");

        let doc = DocumentDescriptor::new("énr/1.1 ática.PDF", "https://x", "spain");
        assert!(!doc.file_stem().contains('/'));
        assert!(!doc.file_stem().ends_with(".PDF"));
    }

    #[test]
    fn test_file_stem_empty_name_falls_back_to_id() {
        let doc = DocumentDescriptor::new("///", "https://x", "spain");
        assert!(doc.file_stem().starts_with("document_"));
    }

    #[test]
    fn test_manifest_defaults_applied() {
        let json = r#"{"name": "ENR 1.1", "source": "https://aip.example/enr11.pdf"}"#;
        let doc: DocumentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(doc.document_type, "AIP");
        assert_eq!(doc.access, "public");
        assert_eq!(doc.section, "GEN");
        assert_eq!(doc.language, vec!["english", "spanish"]);
        assert_eq!(doc.country, "unknown");
    }

    #[test]
    fn test_output_dir_falls_back_to_country() {
        let mut doc = DocumentDescriptor::new("ENR 1.1", "https://x", "spain");
        assert_eq!(doc.output_dir(), PathBuf::from("_AIPs/spain"));
        doc.output_folder = "custom/place".to_string();
        assert_eq!(doc.output_dir(), PathBuf::from("custom/place"));
    }
}
