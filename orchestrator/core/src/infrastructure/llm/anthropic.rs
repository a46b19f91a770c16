// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Anthropic LLM Provider Adapter
//
// Anti-Corruption Layer for the Anthropic Messages API.
// PDFs go out as native `document` parts, images as base64 `image` parts.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::http::{self, VendorHttp};
use crate::domain::document::{embed_document_text, DocumentFormat, TextExtractor};
use crate::domain::llm::{CompletionRequest, CompletionResponse, LLMError, LLMProvider, RetryPolicy};
use crate::domain::provider::ProviderType;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    http: VendorHttp,
    endpoint: String,
    custom_endpoint: bool,
    api_key: Option<String>,
    model: String,
    extractor: Arc<dyn TextExtractor>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: Base64Source },
    Document { source: Base64Source },
}

#[derive(Serialize)]
struct Base64Source {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

impl Base64Source {
    fn new(media_type: &'static str, data: String) -> Self {
        Self {
            kind: "base64",
            media_type,
            data,
        }
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            http: VendorHttp::hosted(),
            endpoint: ProviderType::Anthropic.default_base_url().to_string(),
            custom_endpoint: false,
            api_key,
            model: model.into(),
            extractor,
        }
    }

    pub fn with_base_url(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self.custom_endpoint = true;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.http = self.http.with_retry_policy(retry);
        self
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        content: Vec<ContentBlock>,
    ) -> Result<CompletionResponse, LLMError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| http::missing_key("anthropic"))?;

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
            system: request.system_prompt.as_deref(),
            temperature: request.temperature,
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to encode request: {}", e)))?;

        let url = format!("{}/messages", self.endpoint.trim_end_matches('/'));
        let headers = [
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];

        let started = Instant::now();
        let raw = self.http.post_json(&url, &headers, &body).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed: AnthropicResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        let mut metadata = HashMap::new();
        if let Some(reason) = parsed.stop_reason {
            metadata.insert("stop_reason".to_string(), json!(reason));
        }

        Ok(CompletionResponse {
            content: text,
            provider: ProviderType::Anthropic.to_string(),
            model: self.model.clone(),
            total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            latency_ms,
            timestamp: Utc::now(),
            metadata,
        })
    }
}

#[async_trait]
impl LLMProvider for AnthropicAdapter {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let content = vec![ContentBlock::Text {
            text: request.prompt.clone(),
        }];
        self.send(request, content).await
    }

    async fn analyze_document(
        &self,
        path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError> {
        let request = CompletionRequest::for_document(instruction);
        let content = match DocumentFormat::from_path(path)? {
            DocumentFormat::Image { mime_type } => vec![
                ContentBlock::Image {
                    source: Base64Source::new(mime_type, http::read_base64(path).await?),
                },
                ContentBlock::Text {
                    text: instruction.to_string(),
                },
            ],
            DocumentFormat::Pdf => vec![
                ContentBlock::Document {
                    source: Base64Source::new(
                        DocumentFormat::PDF_MIME,
                        http::read_base64(path).await?,
                    ),
                },
                ContentBlock::Text {
                    text: instruction.to_string(),
                },
            ],
            DocumentFormat::Text => {
                let text = self.extractor.extract_text(path).await?;
                vec![ContentBlock::Text {
                    text: embed_document_text(instruction, &text),
                }]
            }
        };

        let mut response = self.send(&request, content).await?;
        response
            .metadata
            .insert("file_analyzed".to_string(), json!(http::file_label(path)));
        Ok(response)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> Option<&str> {
        self.custom_endpoint.then_some(self.endpoint.as_str())
    }

    fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}
