//! Structured content produced by the extraction stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location of a chunk on a source page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    /// 1-indexed page number.
    pub page: u32,
    /// Bounding box as reported by the extraction service, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<serde_json::Value>,
}

/// One text/table chunk of extracted content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub chunk_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding: Vec<Grounding>,
}

/// One figure (chart, map, diagram) with its OCR text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub figure_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding: Vec<Grounding>,
}

/// Structured content of one document: full markdown plus page-grounded
/// chunks, with figures split out from the text flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    pub filename: String,
    pub markdown: String,
    pub chunks: Vec<Chunk>,
    pub figures: Vec<Figure>,
}

impl StructuredContent {
    /// Highest grounded page number, or 1 for ungrounded content.
    pub fn total_pages(&self) -> u32 {
        self.chunks
            .iter()
            .flat_map(|c| c.grounding.iter())
            .chain(self.figures.iter().flat_map(|f| f.grounding.iter()))
            .map(|g| g.page)
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

/// Persisted extraction artifact: the structured content wrapped with
/// provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEnvelope {
    pub metadata: ExtractionMetadata,
    pub document: StructuredContent,
}

/// Provenance and size metadata for an extraction artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub document_id: String,
    pub source_url: String,
    pub processed_date: DateTime<Utc>,
    pub total_chunks: usize,
    pub total_figures: usize,
    pub total_characters: usize,
}

impl ExtractionEnvelope {
    pub fn new(
        document_id: impl Into<String>,
        source_url: impl Into<String>,
        document: StructuredContent,
    ) -> Self {
        Self {
            metadata: ExtractionMetadata {
                document_id: document_id.into(),
                source_url: source_url.into(),
                processed_date: Utc::now(),
                total_chunks: document.chunks.len(),
                total_figures: document.figures.len(),
                total_characters: document.markdown.len(),
            },
            document,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grounded(page: u32) -> Vec<Grounding> {
        vec![Grounding { page, bbox: None }]
    }

    #[test]
    fn test_total_pages() {
        let content = StructuredContent {
            filename: "doc.pdf".into(),
            markdown: "hello".into(),
            chunks: vec![
                Chunk {
                    id: "chunk_0".into(),
                    content: "a".into(),
                    chunk_type: "text".into(),
                    grounding: grounded(2),
                },
                Chunk {
                    id: "chunk_1".into(),
                    content: "b".into(),
                    chunk_type: "text".into(),
                    grounding: vec![],
                },
            ],
            figures: vec![Figure {
                id: "figure_0".into(),
                text: "chart".into(),
                figure_type: "figure".into(),
                grounding: grounded(5),
            }],
        };
        assert_eq!(content.total_pages(), 5);

        assert_eq!(StructuredContent::default().total_pages(), 1);
    }

    #[test]
    fn test_envelope_counts() {
        let content = StructuredContent {
            filename: "doc.pdf".into(),
            markdown: "abcdef".into(),
            chunks: vec![Chunk {
                id: "chunk_0".into(),
                content: "a".into(),
                chunk_type: "text".into(),
                grounding: vec![],
            }],
            figures: vec![],
        };
        let envelope = ExtractionEnvelope::new("abc123", "https://x", content);
        assert_eq!(envelope.metadata.total_chunks, 1);
        assert_eq!(envelope.metadata.total_figures, 0);
        assert_eq!(envelope.metadata.total_characters, 6);
    }

    #[test]
    fn test_chunk_serializes_type_field() {
        let chunk = Chunk {
            id: "chunk_0".into(),
            content: "a".into(),
            chunk_type: "table".into(),
            grounding: vec![],
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"type\":\"table\""));
    }
}
