//! Vision extraction API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::types::{Chunk, Figure, Grounding, StructuredContent};
use super::{ExtractError, Extractor, ExtractorConfig};

/// Client for a vision document-parsing API.
///
/// Posts the raw document and maps the returned chunk list into
/// [`StructuredContent`], splitting figure chunks out of the text flow.
pub struct VisionExtractor {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

/// Wire format of the parse response.
#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    chunks: Vec<ParseChunk>,
}

#[derive(Debug, Deserialize)]
struct ParseChunk {
    #[serde(default)]
    text: String,
    chunk_type: String,
    #[serde(default)]
    grounding: Vec<ParseGrounding>,
}

#[derive(Debug, Deserialize)]
struct ParseGrounding {
    /// 0-indexed page on the wire.
    page: u32,
    #[serde(rename = "box")]
    bbox: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ParseErrorResponse {
    error: String,
}

impl VisionExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ExtractError {
        if e.is_timeout() {
            ExtractError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            ExtractError::Http(e.to_string())
        }
    }

    /// Convert the wire response into structured content: figure chunks go
    /// to `figures`, everything else to `chunks`, page numbers shifted to
    /// 1-indexed.
    fn into_content(filename: &str, response: ParseResponse) -> StructuredContent {
        let mut chunks = Vec::new();
        let mut figures = Vec::new();

        for parsed in response.chunks {
            let grounding: Vec<Grounding> = parsed
                .grounding
                .into_iter()
                .map(|g| Grounding {
                    page: g.page + 1,
                    bbox: g.bbox,
                })
                .collect();

            if parsed.chunk_type.to_lowercase().contains("figure") {
                figures.push(Figure {
                    id: format!("figure_{}", figures.len()),
                    text: parsed.text,
                    figure_type: parsed.chunk_type,
                    grounding,
                });
            } else {
                chunks.push(Chunk {
                    id: format!("chunk_{}", chunks.len()),
                    content: parsed.text,
                    chunk_type: parsed.chunk_type,
                    grounding,
                });
            }
        }

        StructuredContent {
            filename: filename.to_string(),
            markdown: response.markdown,
            chunks,
            figures,
        }
    }
}

#[async_trait]
impl Extractor for VisionExtractor {
    fn name(&self) -> &str {
        "vision"
    }

    async fn extract(
        &self,
        document: &[u8],
        filename: &str,
    ) -> Result<StructuredContent, ExtractError> {
        debug!("Extracting {} ({} bytes)", filename, document.len());

        let mut request = self
            .client
            .post(format!("{}/v1/parse", self.api_base))
            .header("content-type", "application/pdf")
            .header("x-file-name", filename)
            .body(document.to_vec());
        if let Some(ref key) = self.api_key {
            request = request.header("authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(ExtractError::RateLimited { retry_after_ms });
        }

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ParseErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            if status == 415 || status == 422 {
                return Err(ExtractError::UnsupportedFormat(message));
            }
            return Err(ExtractError::Api { status, message });
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Json(e.to_string()))?;

        let content = Self::into_content(filename, parsed);
        debug!(
            "Extracted {}: {} chunks, {} figures, {} chars",
            filename,
            content.chunks.len(),
            content.figures.len(),
            content.markdown.len()
        );
        Ok(content)
    }
}
