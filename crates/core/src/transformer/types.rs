//! Transformed document types and page grouping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::{Chunk, Figure, StructuredContent};
use crate::manifest::DocumentDescriptor;

/// Structured interpretation of one page (or one figure), as returned by
/// the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPage {
    pub file_name: String,
    pub topics: Vec<String>,
    pub languages: Vec<String>,
    pub description: String,
    /// Free-form extracted key information.
    pub ocr_contents: serde_json::Value,
}

impl StructuredPage {
    /// Fallback used when a page is empty or the model output is unusable:
    /// the raw content is preserved so no extracted text is lost.
    pub fn fallback(
        file_name: impl Into<String>,
        languages: Vec<String>,
        description: impl Into<String>,
        raw_content: &str,
    ) -> Self {
        let mut ocr_contents = serde_json::Map::new();
        if !raw_content.is_empty() {
            ocr_contents.insert(
                "raw_content".to_string(),
                serde_json::Value::String(raw_content.chars().take(500).collect()),
            );
        }
        Self {
            file_name: file_name.into(),
            topics: vec![
                "aviation".to_string(),
                "navigation".to_string(),
                "charts".to_string(),
            ],
            languages,
            description: description.into(),
            ocr_contents: serde_json::Value::Object(ocr_contents),
        }
    }
}

/// One page of the transformed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub page_number: u32,
    /// Concatenated chunk text of the page.
    pub text: String,
    pub structured_page_content: StructuredPage,
    pub structured_image_content: Vec<StructuredPage>,
    /// Reserved for downstream indexing; always empty here.
    #[serde(default)]
    pub text_embedding: Vec<f32>,
}

/// Metadata block of the transformed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMetadata {
    pub document_name: String,
    pub total_pages: u32,
    pub document_type: String,
    pub source: String,
    pub processing_stack: Vec<String>,
    pub processed_date: DateTime<Utc>,
    pub country: String,
    pub publisher: String,
    pub section: String,
    pub access: String,
    pub language: Vec<String>,
    pub total_chunks: usize,
    pub total_figures: usize,
}

impl TransformMetadata {
    pub fn new(
        descriptor: &DocumentDescriptor,
        content: &StructuredContent,
        processing_stack: Vec<String>,
    ) -> Self {
        Self {
            document_name: descriptor.file_stem(),
            total_pages: content.total_pages(),
            document_type: descriptor.document_type.clone(),
            source: descriptor.source.clone(),
            processing_stack,
            processed_date: Utc::now(),
            country: descriptor.country.clone(),
            publisher: descriptor.publisher.clone(),
            section: descriptor.section.clone(),
            access: descriptor.access.clone(),
            language: descriptor.language.clone(),
            total_chunks: content.chunks.len(),
            total_figures: content.figures.len(),
        }
    }
}

/// Final transformed JSON document: metadata plus per-page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedDocument {
    pub metadata: TransformMetadata,
    pub content: Vec<PageContent>,
}

/// Chunks and figures of one page.
#[derive(Debug, Default)]
pub struct PageGroup<'a> {
    pub chunks: Vec<&'a Chunk>,
    pub figures: Vec<&'a Figure>,
}

impl PageGroup<'_> {
    /// Concatenated text content of the page's chunks.
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Group chunks and figures by their grounded page number. Ungrounded
/// content lands on page 1; a chunk grounded on several pages appears on
/// each of them.
pub fn pages_of(content: &StructuredContent) -> BTreeMap<u32, PageGroup<'_>> {
    let mut pages: BTreeMap<u32, PageGroup<'_>> = BTreeMap::new();

    for chunk in &content.chunks {
        if chunk.grounding.is_empty() {
            pages.entry(1).or_default().chunks.push(chunk);
        } else {
            for grounding in &chunk.grounding {
                pages.entry(grounding.page.max(1)).or_default().chunks.push(chunk);
            }
        }
    }
    for figure in &content.figures {
        if figure.grounding.is_empty() {
            pages.entry(1).or_default().figures.push(figure);
        } else {
            for grounding in &figure.grounding {
                pages
                    .entry(grounding.page.max(1))
                    .or_default()
                    .figures
                    .push(figure);
            }
        }
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Grounding;

    fn content() -> StructuredContent {
        StructuredContent {
            filename: "gen21.pdf".into(),
            markdown: "# GEN".into(),
            chunks: vec![
                Chunk {
                    id: "chunk_0".into(),
                    content: "page one text".into(),
                    chunk_type: "text".into(),
                    grounding: vec![Grounding { page: 1, bbox: None }],
                },
                Chunk {
                    id: "chunk_1".into(),
                    content: "page three text".into(),
                    chunk_type: "text".into(),
                    grounding: vec![Grounding { page: 3, bbox: None }],
                },
                Chunk {
                    id: "chunk_2".into(),
                    content: "ungrounded".into(),
                    chunk_type: "text".into(),
                    grounding: vec![],
                },
            ],
            figures: vec![Figure {
                id: "figure_0".into(),
                text: "aerodrome chart".into(),
                figure_type: "figure".into(),
                grounding: vec![Grounding { page: 3, bbox: None }],
            }],
        }
    }

    #[test]
    fn test_pages_of_grouping() {
        let content = content();
        let pages = pages_of(&content);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[&1].chunks.len(), 2); // grounded + ungrounded
        assert_eq!(pages[&3].chunks.len(), 1);
        assert_eq!(pages[&3].figures.len(), 1);
        assert_eq!(pages[&1].text(), "page one text\nungrounded");
    }

    #[test]
    fn test_fallback_truncates_raw_content() {
        let long = "x".repeat(2000);
        let page = StructuredPage::fallback("doc", vec!["english".into()], "desc", &long);
        let raw = page.ocr_contents["raw_content"].as_str().unwrap();
        assert_eq!(raw.len(), 500);
    }

    #[test]
    fn test_metadata_from_descriptor() {
        let descriptor =
            DocumentDescriptor::new("GEN 2.1.pdf", "https://aip.example/gen21.pdf", "spain");
        let content = content();
        let metadata = TransformMetadata::new(&descriptor, &content, vec!["llm".into()]);
        assert_eq!(metadata.document_name, "GEN_2.1");
        assert_eq!(metadata.total_pages, 3);
        assert_eq!(metadata.country, "spain");
        assert_eq!(metadata.total_chunks, 3);
        assert_eq!(metadata.total_figures, 1);
    }
}
