//! Testing utilities and mock implementations for integration tests.
//!
//! This module provides mock implementations of the three collaborator
//! traits, allowing full pipeline testing without any network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use aeropipe_core::testing::{MockExtractor, MockFetcher, MockTransformer};
//!
//! let fetcher = MockFetcher::new();
//! let extractor = MockExtractor::new();
//! let transformer = MockTransformer::new();
//!
//! // Configure mock behavior
//! fetcher.push_failure(url, FetchError::Timeout { timeout_secs: 30 }).await;
//! extractor.set_failure(ExtractError::UnsupportedFormat("scan".into())).await;
//!
//! // Wire into a StageRunner / BatchOrchestrator...
//! ```

mod mock_extractor;
mod mock_fetcher;
mod mock_transformer;

pub use mock_extractor::{MockExtractor, RecordedExtraction};
pub use mock_fetcher::MockFetcher;
pub use mock_transformer::MockTransformer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::extractor::{Chunk, Figure, Grounding, StructuredContent};
    use crate::manifest::DocumentDescriptor;

    /// Create a test document descriptor with reasonable defaults.
    pub fn descriptor(name: &str, country: &str) -> DocumentDescriptor {
        DocumentDescriptor::new(
            name,
            format!(
                "https://aip.example/{}/{}.pdf",
                country,
                name.to_lowercase().replace(' ', "-")
            ),
            country,
        )
    }

    /// Create structured content with one text chunk per page and an
    /// optional figure on the last page.
    pub fn structured_content(filename: &str, pages: u32, with_figure: bool) -> StructuredContent {
        let chunks = (1..=pages)
            .map(|page| Chunk {
                id: format!("chunk_{}", page - 1),
                content: format!("Text of page {page}"),
                chunk_type: "text".to_string(),
                grounding: vec![Grounding { page, bbox: None }],
            })
            .collect();

        let figures = if with_figure {
            vec![Figure {
                id: "figure_0".to_string(),
                text: "Aerodrome obstacle chart".to_string(),
                figure_type: "figure".to_string(),
                grounding: vec![Grounding { page: pages.max(1), bbox: None }],
            }]
        } else {
            vec![]
        };

        StructuredContent {
            filename: filename.to_string(),
            markdown: (1..=pages)
                .map(|page| format!("## Page {page}"))
                .collect::<Vec<_>>()
                .join("\n"),
            chunks,
            figures,
        }
    }
}
