//! Manifest loading and discovery.
//!
//! A manifest is a JSON array of document descriptors, stored at a
//! country-scoped location under the work dir:
//! `{work}/_AIPs/{country}/docs_to_process/{country}_Docs_AIP_links.json`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::DocumentDescriptor;
use super::ManifestError;

/// Countries probed when neither a country nor an explicit manifest path
/// is given.
const KNOWN_COUNTRIES: [&str; 3] = ["argentina", "dominican_republic", "spain"];

/// Conventional manifest path for a country batch.
pub fn manifest_path(work_dir: &Path, country: &str) -> PathBuf {
    work_dir
        .join("_AIPs")
        .join(country)
        .join("docs_to_process")
        .join(format!("{country}_Docs_AIP_links.json"))
}

/// Load and validate a manifest file.
///
/// Descriptors missing a name or source are rejected; optional metadata
/// fields fall back to their defaults. Duplicate document ids within one
/// manifest are an error since the ledger is keyed by id.
pub fn load_manifest(path: &Path) -> Result<Vec<DocumentDescriptor>, ManifestError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut documents: Vec<DocumentDescriptor> =
        serde_json::from_str(&raw).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut seen = std::collections::BTreeSet::new();
    for (index, doc) in documents.iter_mut().enumerate() {
        if doc.name.trim().is_empty() {
            return Err(ManifestError::MissingField {
                index,
                field: "name",
            });
        }
        if doc.source.trim().is_empty() {
            return Err(ManifestError::MissingField {
                index,
                field: "source",
            });
        }
        if doc.output_folder.is_empty() {
            doc.output_folder = format!("_AIPs/{}", doc.country);
        }
        if !seen.insert(doc.doc_id()) {
            return Err(ManifestError::DuplicateDocument {
                doc_id: doc.doc_id(),
                name: doc.name.clone(),
            });
        }
    }

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Resolve the manifest location for a run.
///
/// Order: an explicit path wins; otherwise the conventional path for the
/// given country; otherwise each known country directory is probed and the
/// first hit is used. The resolved country is returned alongside the path
/// so the caller can scope the batch state directory.
pub fn discover_manifest(
    work_dir: &Path,
    country: Option<&str>,
    explicit: Option<&Path>,
) -> Result<(PathBuf, String), ManifestError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let country = country
            .map(str::to_string)
            .or_else(|| country_from_manifest(path))
            .ok_or(ManifestError::UnknownCountry)?;
        return Ok((path.to_path_buf(), country));
    }

    if let Some(country) = country {
        let path = manifest_path(work_dir, country);
        if !path.exists() {
            return Err(ManifestError::NotFound { path });
        }
        return Ok((path, country.to_string()));
    }

    for candidate in KNOWN_COUNTRIES {
        let path = manifest_path(work_dir, candidate);
        if path.exists() {
            debug!("Auto-detected manifest at {}", path.display());
            return Ok((path, candidate.to_string()));
        }
    }

    Err(ManifestError::UnknownCountry)
}

/// Infer the batch country from the first descriptor's output folder,
/// e.g. `_AIPs/argentina` -> `argentina`.
fn country_from_manifest(path: &Path) -> Option<String> {
    let documents = load_manifest(path).ok()?;
    let first = documents.first()?;
    let folder = first.output_dir();
    let mut parts = folder.iter();
    if parts.next()?.to_str()? == "_AIPs" {
        return Some(parts.next()?.to_str()?.to_string());
    }
    Some(first.country.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, country: &str, body: &str) -> PathBuf {
        let path = manifest_path(dir, country);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_manifest_valid() {
        let temp = TempDir::new().unwrap();
        let path = write_manifest(
            temp.path(),
            "spain",
            r#"[
                {"name": "GEN 2.1", "source": "https://aip.example/gen21.pdf", "country": "spain",
                 "section": "GEN", "publisher": "ENAIRE", "output_folder": "_AIPs/spain"},
                {"name": "ENR 1.1", "source": "https://aip.example/enr11.pdf", "country": "spain"}
            ]"#,
        );

        let docs = load_manifest(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].publisher, "ENAIRE");
        // output_folder filled in from the country when omitted
        assert_eq!(docs[1].output_folder, "_AIPs/spain");
    }

    #[test]
    fn test_load_manifest_missing_source() {
        let temp = TempDir::new().unwrap();
        let path = write_manifest(
            temp.path(),
            "spain",
            r#"[{"name": "GEN 2.1", "source": ""}]"#,
        );
        let err = load_manifest(&path).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingField { field: "source", .. }
        ));
    }

    #[test]
    fn test_load_manifest_rejects_duplicates() {
        let temp = TempDir::new().unwrap();
        let path = write_manifest(
            temp.path(),
            "spain",
            r#"[
                {"name": "GEN 2.1", "source": "https://aip.example/gen21.pdf", "country": "spain"},
                {"name": "GEN 2.1", "source": "https://aip.example/gen21.pdf", "country": "spain"}
            ]"#,
        );
        let err = load_manifest(&path).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateDocument { .. }));
    }

    #[test]
    fn test_load_manifest_not_an_array() {
        let temp = TempDir::new().unwrap();
        let path = write_manifest(temp.path(), "spain", r#"{"documents": []}"#);
        let err = load_manifest(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_discover_by_country() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "argentina", "[]");

        let (path, country) = discover_manifest(temp.path(), Some("argentina"), None).unwrap();
        assert!(path.ends_with("argentina_Docs_AIP_links.json"));
        assert_eq!(country, "argentina");

        let err = discover_manifest(temp.path(), Some("spain"), None).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }

    #[test]
    fn test_discover_probes_known_countries() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), "dominican_republic", "[]");

        let (_, country) = discover_manifest(temp.path(), None, None).unwrap();
        assert_eq!(country, "dominican_republic");
    }

    #[test]
    fn test_discover_explicit_path_infers_country() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs.json");
        std::fs::write(
            &path,
            r#"[{"name": "GEN 2.1", "source": "https://x", "country": "spain",
                "output_folder": "_AIPs/spain"}]"#,
        )
        .unwrap();

        let (resolved, country) = discover_manifest(temp.path(), None, Some(&path)).unwrap();
        assert_eq!(resolved, path);
        assert_eq!(country, "spain");
    }

    #[test]
    fn test_discover_nothing_found() {
        let temp = TempDir::new().unwrap();
        let err = discover_manifest(temp.path(), None, None).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownCountry));
    }
}
