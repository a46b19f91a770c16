// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama LLM Provider Adapter
//
// Anti-Corruption Layer for Ollama local models. No API key, longer timeout.
// Images ride in the `images` field; everything else is extracted to text.

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

pub struct OllamaAdapter {
    http: VendorHttp,
    endpoint: String,
    model: String,
    extractor: Arc<dyn TextExtractor>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

impl OllamaAdapter {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            http: VendorHttp::local(),
            endpoint: endpoint.into(),
            model: model.into(),
            extractor,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.http = self.http.with_retry_policy(retry);
        self
    }

    async fn generate(
        &self,
        request: &CompletionRequest,
        prompt: &str,
        images: Vec<String>,
    ) -> Result<CompletionResponse, LLMError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            system: request.system_prompt.as_deref(),
            images,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to encode request: {}", e)))?;

        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let started = Instant::now();
        let raw = self.http.post_json(&url, &[], &body).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed: OllamaResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let input_tokens = parsed.prompt_eval_count.unwrap_or(0);
        let output_tokens = parsed.eval_count.unwrap_or(0);
        let mut metadata = HashMap::new();
        metadata.insert("done".to_string(), json!(parsed.done));

        Ok(CompletionResponse {
            content: parsed.response,
            provider: ProviderType::Ollama.to_string(),
            model: self.model.clone(),
            total_tokens: input_tokens + output_tokens,
            input_tokens,
            output_tokens,
            latency_ms,
            timestamp: Utc::now(),
            metadata,
        })
    }
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.generate(request, &request.prompt, Vec::new()).await
    }

    async fn analyze_document(
        &self,
        path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError> {
        let request = CompletionRequest::for_document(instruction);
        let mut response = match DocumentFormat::from_path(path)? {
            DocumentFormat::Image { .. } => {
                let image = http::read_base64(path).await?;
                self.generate(&request, instruction, vec![image]).await?
            }
            DocumentFormat::Pdf | DocumentFormat::Text => {
                let text = self.extractor.extract_text(path).await?;
                let prompt = embed_document_text(instruction, &text);
                self.generate(&request, &prompt, Vec::new()).await?
            }
        };
        response
            .metadata
            .insert("file_analyzed".to_string(), json!(http::file_label(path)));
        Ok(response)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.endpoint)
    }

    fn has_credentials(&self) -> bool {
        true
    }
}
