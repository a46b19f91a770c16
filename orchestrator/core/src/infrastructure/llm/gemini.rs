// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Google Gemini LLM Provider Adapter
//
// Anti-Corruption Layer for the Gemini generateContent API. The key travels
// in the `x-goog-api-key` header so it never shows up in URLs or diagnostics.

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

pub struct GeminiAdapter {
    http: VendorHttp,
    endpoint: String,
    custom_endpoint: bool,
    api_key: Option<String>,
    model: String,
    extractor: Arc<dyn TextExtractor>,
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    /// Thought summaries are not part of the answer
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
    #[serde(default)]
    thoughts_token_count: u32,
}

impl GeminiAdapter {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            http: VendorHttp::hosted(),
            endpoint: ProviderType::Google.default_base_url().to_string(),
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
        parts: Vec<Part>,
    ) -> Result<CompletionResponse, LLMError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| http::missing_key("google"))?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            system_instruction: request.system_prompt.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part::Text {
                    text: system.clone(),
                }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to encode request: {}", e)))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        let headers = [("x-goog-api-key", api_key.to_string())];

        let started = Instant::now();
        let raw = self.http.post_json(&url, &headers, &body).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed: GenerateContentResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::InvalidResponse("No candidates in response".into()))?;

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        let usage = parsed.usage_metadata;
        let mut metadata = HashMap::new();
        if let Some(reason) = candidate.finish_reason {
            metadata.insert("finish_reason".to_string(), json!(reason));
        }
        if usage.thoughts_token_count > 0 {
            metadata.insert("thoughts_tokens".to_string(), json!(usage.thoughts_token_count));
        }

        Ok(CompletionResponse {
            content: text,
            provider: ProviderType::Google.to_string(),
            model: self.model.clone(),
            total_tokens: usage.total_token_count,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            latency_ms,
            timestamp: Utc::now(),
            metadata,
        })
    }
}

#[async_trait]
impl LLMProvider for GeminiAdapter {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let parts = vec![Part::Text {
            text: request.prompt.clone(),
        }];
        self.send(request, parts).await
    }

    async fn analyze_document(
        &self,
        path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError> {
        let request = CompletionRequest::for_document(instruction);
        let inline = |mime_type: &'static str, data: String| Part::InlineData {
            inline_data: InlineData { mime_type, data },
        };
        let parts = match DocumentFormat::from_path(path)? {
            DocumentFormat::Image { mime_type } => vec![
                Part::Text {
                    text: instruction.to_string(),
                },
                inline(mime_type, http::read_base64(path).await?),
            ],
            DocumentFormat::Pdf => vec![
                Part::Text {
                    text: instruction.to_string(),
                },
                inline(DocumentFormat::PDF_MIME, http::read_base64(path).await?),
            ],
            DocumentFormat::Text => {
                let text = self.extractor.extract_text(path).await?;
                vec![Part::Text {
                    text: embed_document_text(instruction, &text),
                }]
            }
        };

        let mut response = self.send(&request, parts).await?;
        response
            .metadata
            .insert("file_analyzed".to_string(), json!(http::file_label(path)));
        Ok(response)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Google
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::text_extraction::PlainTextExtractor;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_generate_content_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-2.5-flash:generateContent")
            .match_header("x-goog-api-key", "g-key")
            .match_body(Matcher::PartialJson(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "2+2?" }] }],
                "system_instruction": { "parts": [{ "text": "math tutor" }] },
                "generationConfig": { "maxOutputTokens": 64, "temperature": 0.0 }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "candidates": [{
                        "content": { "parts": [
                            { "text": "thinking...", "thought": true },
                            { "text": "4" }
                        ]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {
                        "promptTokenCount": 7,
                        "candidatesTokenCount": 1,
                        "totalTokenCount": 20,
                        "thoughtsTokenCount": 12
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(
            Some("g-key".into()),
            "gemini-2.5-flash",
            Arc::new(PlainTextExtractor::new()),
        )
        .with_base_url(server.url());
        let request = CompletionRequest::new("2+2?")
            .with_system_prompt("math tutor")
            .with_temperature(0.0)
            .with_max_tokens(64);
        let response = adapter.complete(&request).await.unwrap();

        assert_eq!(response.content, "4");
        assert_eq!(response.input_tokens, 7);
        assert_eq!(response.total_tokens, 20);
        assert_eq!(response.metadata["finish_reason"], "STOP");
        assert_eq!(response.metadata["thoughts_tokens"], 12);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_key_never_in_diagnostic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-2.5-pro:generateContent")
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad request"}}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::new(
            Some("super-secret".into()),
            "gemini-2.5-pro",
            Arc::new(PlainTextExtractor::new()),
        )
        .with_base_url(server.url());
        let err = adapter
            .complete(&CompletionRequest::new("hi"))
            .await
            .unwrap_err();

        let rendered = err.to_string();
        assert!(rendered.contains("HTTP 400"));
        assert!(rendered.contains("bad request"));
        assert!(!rendered.contains("super-secret"));
    }
}
