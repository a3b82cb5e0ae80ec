//! LLM transformation client for chat-completions compatible APIs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extractor::StructuredContent;
use crate::manifest::DocumentDescriptor;

use super::types::{pages_of, PageContent, StructuredPage, TransformMetadata, TransformedDocument};
use super::{TransformError, Transformer, TransformerConfig};

/// Transformer backed by a chat-completions API.
///
/// Each page of extracted text (and each figure) is structured with a
/// single model call requesting a JSON object response. Transient API
/// failures bubble up so the stage retry policy applies; a permanent
/// per-page failure degrades to a raw-content fallback page instead of
/// losing the whole document.
pub struct LlmTransformer {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    page_max_tokens: u32,
    figure_max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    message: String,
}

impl LlmTransformer {
    pub fn new(config: &TransformerConfig) -> Result<Self, TransformError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransformError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            page_max_tokens: config.page_max_tokens,
            figure_max_tokens: config.figure_max_tokens,
        })
    }

    fn structuring_prompt(kind: &str, markdown: &str) -> String {
        format!(
            "This is the {kind} OCR in markdown:\n\
             ====MARKDOWN====\n\
             {markdown}\n\
             ====END MARKDOWN====\n\
             Convert this into a structured JSON response with the following fields:\n\
             - file_name: string\n\
             - topics: list of strings\n\
             - languages: list of strings\n\
             - description: string\n\
             - ocr_contents: dictionary with the main extracted information\n\
             Respond only with the JSON object."
        )
    }

    async fn complete_json(
        &self,
        prompt: String,
        max_tokens: u32,
    ) -> Result<StructuredPage, TransformError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
            temperature: 0.2,
            max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base))
            .header("content-type", "application/json")
            .json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransformError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                TransformError::Http(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(TransformError::RateLimited);
        }
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ChatErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(TransformError::Api { status, message });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransformError::SchemaViolation(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TransformError::SchemaViolation("empty choices".to_string()))?;

        serde_json::from_str(&content)
            .map_err(|e| TransformError::SchemaViolation(format!("{e}: {content}")))
    }

    /// Structure one page of text, degrading to a fallback page on
    /// permanent errors. Transient errors bubble up for the retry policy.
    async fn structure_page(
        &self,
        descriptor: &DocumentDescriptor,
        page_number: u32,
        page_text: &str,
    ) -> Result<StructuredPage, TransformError> {
        if page_text.trim().is_empty() {
            return Ok(StructuredPage::fallback(
                descriptor.file_stem(),
                descriptor.language.clone(),
                "Empty page",
                "",
            ));
        }

        match self
            .complete_json(
                Self::structuring_prompt("pages", page_text),
                self.page_max_tokens,
            )
            .await
        {
            Ok(page) => Ok(page),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(
                    "Structuring page {} of {} failed, keeping raw content: {}",
                    page_number,
                    descriptor.name,
                    e
                );
                Ok(StructuredPage::fallback(
                    descriptor.file_stem(),
                    descriptor.language.clone(),
                    "Page content from aeronautical document",
                    page_text,
                ))
            }
        }
    }

    /// Structure one figure's OCR text; empty figures are skipped.
    async fn structure_figure(
        &self,
        descriptor: &DocumentDescriptor,
        page_number: u32,
        index: usize,
        figure_text: &str,
    ) -> Result<Option<StructuredPage>, TransformError> {
        if figure_text.trim().is_empty() {
            return Ok(None);
        }

        match self
            .complete_json(
                Self::structuring_prompt("image", figure_text),
                self.figure_max_tokens,
            )
            .await
        {
            Ok(page) => Ok(Some(page)),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(
                    "Structuring figure {} on page {} of {} failed, keeping raw content: {}",
                    index, page_number, descriptor.name, e
                );
                Ok(Some(StructuredPage::fallback(
                    format!("image_p{page_number}_i{index}"),
                    descriptor.language.clone(),
                    "Image from aeronautical document",
                    figure_text,
                )))
            }
        }
    }
}

#[async_trait]
impl Transformer for LlmTransformer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn transform(
        &self,
        content: &StructuredContent,
        descriptor: &DocumentDescriptor,
    ) -> Result<TransformedDocument, TransformError> {
        let pages = pages_of(content);
        let total_pages = content.total_pages();
        let mut page_contents = Vec::with_capacity(total_pages as usize);

        for page_number in 1..=total_pages {
            let (page_text, figures) = match pages.get(&page_number) {
                Some(group) => (
                    group.text(),
                    group.figures.iter().map(|f| f.text.clone()).collect(),
                ),
                None => (String::new(), Vec::<String>::new()),
            };

            let structured_page = self
                .structure_page(descriptor, page_number, &page_text)
                .await?;

            let mut structured_images = Vec::new();
            for (index, figure_text) in figures.iter().enumerate() {
                if let Some(structured) = self
                    .structure_figure(descriptor, page_number, index, figure_text)
                    .await?
                {
                    structured_images.push(structured);
                }
            }

            page_contents.push(PageContent {
                page_number,
                text: page_text,
                structured_page_content: structured_page,
                structured_image_content: structured_images,
                text_embedding: Vec::new(),
            });
        }

        debug!(
            "Transformed {}: {} pages, {} chunks, {} figures",
            descriptor.name,
            total_pages,
            content.chunks.len(),
            content.figures.len()
        );

        Ok(TransformedDocument {
            metadata: TransformMetadata::new(
                descriptor,
                content,
                vec!["vision-extract".to_string(), self.model.clone()],
            ),
            content: page_contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_markdown_delimiters() {
        let prompt = LlmTransformer::structuring_prompt("pages", "# GEN 2.1");
        assert!(prompt.contains("====MARKDOWN===="));
        assert!(prompt.contains("# GEN 2.1"));
        assert!(prompt.contains("ocr_contents"));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "mistral-large-latest".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
            temperature: 0.2,
            max_tokens: 4000,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"response_format\":{\"type\":\"json_object\"}"));
        assert!(json.contains("\"temperature\":0.2"));
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices": [{"message": {"content": "{\"file_name\": \"x\", \"topics\": [], \"languages\": [], \"description\": \"d\", \"ocr_contents\": {}}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        let page: StructuredPage =
            serde_json::from_str(&parsed.choices[0].message.content).unwrap();
        assert_eq!(page.file_name, "x");
    }
}
