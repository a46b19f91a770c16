// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI LLM Provider Adapter
//
// Anti-Corruption Layer for the OpenAI chat/completions API.
// Also works with OpenAI-compatible APIs (vLLM, LM Studio, DeepSeek...).
//
// Reasoning-class models get `max_completion_tokens`, a `reasoning_effort`
// level, the `developer` role for system prompts and no temperature. When
// they return no visible text the call is repeated with escalating effort.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::http::{self, VendorHttp};
use crate::domain::document::{embed_document_text, DocumentFormat, TextExtractor};
use crate::domain::llm::{
    CompletionRequest, CompletionResponse, EffortEscalation, LLMError, LLMProvider,
    ReasoningEffort, RetryPolicy,
};
use crate::domain::model_catalog::ModelClass;
use crate::domain::provider::ProviderType;

pub struct OpenAIAdapter {
    http: VendorHttp,
    provider_type: ProviderType,
    endpoint: String,
    custom_endpoint: bool,
    api_key: Option<String>,
    model: String,
    extractor: Arc<dyn TextExtractor>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize, Default)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u32,
}

impl OpenAIAdapter {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            http: VendorHttp::hosted(),
            provider_type: ProviderType::OpenAI,
            endpoint: ProviderType::OpenAI.default_base_url().to_string(),
            custom_endpoint: false,
            api_key,
            model: model.into(),
            extractor,
        }
    }

    /// Adapter for a self-hosted or third-party OpenAI-compatible endpoint
    pub fn compatible(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            provider_type: ProviderType::OpenAICompatible,
            ..Self::new(api_key, model, extractor).with_base_url(endpoint)
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

    pub fn model_class(&self) -> ModelClass {
        ModelClass::of(&self.model)
    }

    /// Run one logical completion. `user_content` is either a string or an
    /// array of content parts.
    async fn run(
        &self,
        request: &CompletionRequest,
        user_content: Value,
    ) -> Result<CompletionResponse, LLMError> {
        // Keyless hosted calls can never succeed; compatible servers may not need one
        let api_key = match (&self.api_key, self.provider_type) {
            (Some(key), _) => Some(key.as_str()),
            (None, ProviderType::OpenAICompatible) => None,
            (None, _) => return Err(http::missing_key(self.provider_type.as_str())),
        };

        let class = self.model_class();
        if !class.is_reasoning() {
            let payload = build_chat_payload(&self.model, class, request, user_content, None);
            return self.send(api_key, &payload, None, 1).await;
        }

        let escalation = EffortEscalation::new(
            request.reasoning_effort,
            self.http.retry_policy().max_attempts,
        );
        let mut attempt = 0;
        loop {
            let effort = escalation
                .effort_for(attempt)
                .unwrap_or(ReasoningEffort::High);
            // Fresh payload per attempt; the caller's request is never touched
            let payload =
                build_chat_payload(&self.model, class, request, user_content.clone(), Some(effort));
            let response = self.send(api_key, &payload, Some(effort), attempt + 1).await?;

            if !response.content.trim().is_empty() {
                return Ok(response);
            }

            attempt += 1;
            let empty = LLMError::EmptyReasoningOutput {
                model: self.model.clone(),
                attempts: attempt,
            };
            if attempt >= escalation.max_attempts() {
                warn!(error = %empty, "Returning last empty reasoning response");
                return Ok(response);
            }

            let delay = self.http.retry_policy().delay_after(attempt - 1);
            warn!(
                model = %self.model,
                effort = %effort,
                next_effort = ?escalation.effort_for(attempt),
                delay_ms = delay.as_millis() as u64,
                "Reasoning model returned empty content, escalating effort"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send(
        &self,
        api_key: Option<&str>,
        payload: &Value,
        effort: Option<ReasoningEffort>,
        attempt: u32,
    ) -> Result<CompletionResponse, LLMError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let headers: Vec<(&str, String)> = api_key
            .map(|key| vec![("Authorization", format!("Bearer {}", key))])
            .unwrap_or_default();

        let started = Instant::now();
        let raw = self.http.post_json(&url, &headers, payload).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed: OpenAIResponse = serde_json::from_value(raw)
            .map_err(|e| LLMError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::InvalidResponse("No choices in response".into()))?;

        let mut metadata = HashMap::new();
        if let Some(reason) = choice.finish_reason {
            metadata.insert("finish_reason".to_string(), json!(reason));
        }
        if let Some(effort) = effort {
            let reasoning_tokens = parsed
                .usage
                .completion_tokens_details
                .as_ref()
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0);
            metadata.insert("reasoning_tokens".to_string(), json!(reasoning_tokens));
            metadata.insert("reasoning_effort".to_string(), json!(effort.as_str()));
            metadata.insert("attempts".to_string(), json!(attempt));
        }

        debug!(model = %self.model, latency_ms, attempt, "OpenAI completion finished");

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            provider: self.provider_type.to_string(),
            model: self.model.clone(),
            total_tokens: parsed.usage.total_tokens,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
            latency_ms,
            timestamp: Utc::now(),
            metadata,
        })
    }
}

/// Chat payload for one attempt.
///
/// Standard models always carry `temperature` and `max_tokens`; reasoning
/// models always carry `reasoning_effort` and `max_completion_tokens`.
pub(crate) fn build_chat_payload(
    model: &str,
    class: ModelClass,
    request: &CompletionRequest,
    user_content: Value,
    effort: Option<ReasoningEffort>,
) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        let role = if class.is_reasoning() { "developer" } else { "system" };
        messages.push(json!({ "role": role, "content": system }));
    }
    messages.push(json!({ "role": "user", "content": user_content }));

    let mut payload = json!({ "model": model, "messages": messages });
    if class.is_reasoning() {
        let effort = effort
            .or(request.reasoning_effort)
            .unwrap_or(ReasoningEffort::DEFAULT);
        payload["max_completion_tokens"] = json!(request.max_tokens);
        payload["reasoning_effort"] = json!(effort.as_str());
    } else {
        payload["max_tokens"] = json!(request.max_tokens);
        payload["temperature"] = json!(request
            .temperature
            .unwrap_or(CompletionRequest::DEFAULT_TEMPERATURE));
    }
    payload
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.run(request, json!(request.prompt)).await
    }

    async fn analyze_document(
        &self,
        path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError> {
        let format = DocumentFormat::from_path(path)?;
        let mut response = match format {
            DocumentFormat::Image { mime_type } => {
                let data = http::read_base64(path).await?;
                let parts = json!([
                    { "type": "text", "text": instruction },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:{};base64,{}", mime_type, data) }
                    }
                ]);
                self.run(&CompletionRequest::for_document(instruction), parts)
                    .await?
            }
            // No native document part on chat/completions
            DocumentFormat::Pdf | DocumentFormat::Text => {
                let text = self.extractor.extract_text(path).await?;
                let request = CompletionRequest::for_document(embed_document_text(instruction, &text));
                self.run(&request, json!(request.prompt)).await?
            }
        };
        response
            .metadata
            .insert("file_analyzed".to_string(), json!(http::file_label(path)));
        Ok(response)
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
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

    fn adapter(server: &mockito::Server, model: &str) -> OpenAIAdapter {
        OpenAIAdapter::new(Some("sk-test".into()), model, Arc::new(PlainTextExtractor::new()))
            .with_base_url(server.url())
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    fn chat_body(content: &str) -> String {
        json!({
            "choices": [{ "message": { "content": content }, "finish_reason": "stop" }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15,
                "completion_tokens_details": { "reasoning_tokens": 3 }
            }
        })
        .to_string()
    }

    #[test]
    fn test_standard_payload_shape() {
        let request = CompletionRequest::new("hi").with_system_prompt("be brief");
        let payload =
            build_chat_payload("gpt-4o", ModelClass::Standard, &request, json!("hi"), None);
        assert_eq!(payload["temperature"], json!(CompletionRequest::DEFAULT_TEMPERATURE));
        assert_eq!(payload["max_tokens"], 4096);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert!(payload.get("reasoning_effort").is_none());
        assert!(payload.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_reasoning_payload_shape() {
        let request = CompletionRequest::new("hi")
            .with_system_prompt("be brief")
            .with_temperature(0.2);
        let payload = build_chat_payload(
            "o3-mini",
            ModelClass::Reasoning,
            &request,
            json!("hi"),
            Some(ReasoningEffort::Low),
        );
        assert!(payload.get("temperature").is_none());
        assert!(payload.get("max_tokens").is_none());
        assert_eq!(payload["max_completion_tokens"], 4096);
        assert_eq!(payload["reasoning_effort"], "low");
        assert_eq!(payload["messages"][0]["role"], "developer");
    }

    #[tokio::test]
    async fn test_standard_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "temperature": 0.0
            })))
            .with_status(200)
            .with_body(chat_body("4"))
            .create_async()
            .await;

        let response = adapter(&server, "gpt-4o")
            .complete(&CompletionRequest::new("2+2?").with_temperature(0.0))
            .await
            .unwrap();

        assert_eq!(response.content, "4");
        assert_eq!(response.provider, "openai");
        assert_eq!(response.total_tokens, 15);
        assert_eq!(response.metadata["finish_reason"], "stop");
        assert!(!response.metadata.contains_key("attempts"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_reasoning_output_escalates_effort() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({ "reasoning_effort": "low" })))
            .with_status(200)
            .with_body(chat_body(""))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({ "reasoning_effort": "medium" })))
            .with_status(200)
            .with_body(chat_body("done"))
            .expect(1)
            .create_async()
            .await;

        let response = adapter(&server, "gpt-5-mini")
            .complete(&CompletionRequest::new("think"))
            .await
            .unwrap();

        assert_eq!(response.content, "done");
        assert_eq!(response.metadata["attempts"], 2);
        assert_eq!(response.metadata["reasoning_effort"], "medium");
        assert_eq!(response.metadata["reasoning_tokens"], 3);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_o_series_defaults_to_low_effort() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({ "reasoning_effort": "low" })))
            .with_status(200)
            .with_body(chat_body("hello"))
            .expect(1)
            .create_async()
            .await;

        let response = adapter(&server, "o3")
            .complete(&CompletionRequest::new("hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(response.metadata["reasoning_effort"], "low");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_reasoning_output_gives_up_after_cap() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(chat_body(""))
            .expect(3)
            .create_async()
            .await;

        let response = adapter(&server, "o3")
            .complete(&CompletionRequest::new("think"))
            .await
            .unwrap();

        assert!(response.content.is_empty());
        assert_eq!(response.metadata["attempts"], 3);
        assert_eq!(response.metadata["reasoning_effort"], "high");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let adapter = OpenAIAdapter::new(None, "gpt-4o", Arc::new(PlainTextExtractor::new()));
        assert!(!adapter.has_credentials());
        let err = adapter.complete(&CompletionRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LLMError::FatalVendor { status: None, .. }));
    }

    #[tokio::test]
    async fn test_text_document_is_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.txt");
        std::fs::write(&path, "1) 4").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("Document content:\\\\n1\\) 4".into()))
            .with_status(200)
            .with_body(chat_body("{}"))
            .create_async()
            .await;

        let response = adapter(&server, "gpt-4o")
            .analyze_document(&path, "Extract answers")
            .await
            .unwrap();
        assert_eq!(response.metadata["file_analyzed"], "answers.txt");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let adapter = OpenAIAdapter::new(Some("k".into()), "gpt-4o", Arc::new(PlainTextExtractor::new()));
        let err = adapter
            .analyze_document(Path::new("sheet.xlsx"), "read")
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::UnsupportedFormat(_)));
    }
}
