// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Completion Port shared by every vendor adapter.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Vendor-neutral completion contract, request/response types,
//!   error taxonomy and retry schedules

// LLM Provider Domain Interface (Anti-Corruption Layer)
//
// The grading pipeline only ever talks to `LLMProvider`. Each vendor adapter in
// infrastructure/llm/ translates this contract into its own wire format.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::provider::ProviderType;

/// Domain interface for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Text-only completion
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LLMError>;

    /// Multimodal analysis of a file on disk
    async fn analyze_document(
        &self,
        path: &Path,
        instruction: &str,
    ) -> Result<CompletionResponse, LLMError>;

    /// Vendor family this adapter speaks to
    fn provider_type(&self) -> ProviderType;

    /// Model id sent on the wire
    fn model(&self) -> &str;

    /// Endpoint override, if any
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Whether a credential was resolved for this adapter.
    /// Local models never need one.
    fn has_credentials(&self) -> bool;

    /// Identifier recorded on persisted records, e.g. `openai_gpt-4o`
    fn identifier(&self) -> String {
        format!("{}_{}", self.provider_type(), self.model())
    }
}

/// Reasoning effort accepted by reasoning-class models
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    /// Effort sent when the caller leaves it unset. `minimal` is rejected by
    /// the o-series models.
    pub const DEFAULT: Self = Self::Low;

    /// Next level up, saturating at `High`
    pub fn escalate(self) -> Self {
        match self {
            Self::Minimal => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a single completion call. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature. Dropped for reasoning-class models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    pub max_tokens: u32,

    /// Only honoured by reasoning-class models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl CompletionRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;

    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: Some(Self::DEFAULT_TEMPERATURE),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            reasoning_effort: None,
        }
    }

    /// Request used for document analysis: vendor default sampling
    pub fn for_document(instruction: impl Into<String>) -> Self {
        Self {
            temperature: None,
            ..Self::new(instruction)
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }
}

/// Normalized result of any successful vendor call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,

    /// Vendor family name (e.g. "openai", "ollama")
    pub provider: String,

    /// Model used (e.g. "gpt-4o", "llama3")
    pub model: String,

    pub total_tokens: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,

    /// Vendor-specific extras: finish reason, reasoning tokens, attempts...
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompletionResponse {
    /// `vendor/model`, the provenance key used in run reports
    pub fn provenance(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    /// Timeout, connection failure, HTTP 429 or 5xx. Retried inside adapters.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Non-retryable vendor failure, or transient failures that exhausted
    /// every attempt
    #[error("Vendor error: {diagnostic}")]
    FatalVendor {
        status: Option<u16>,
        diagnostic: String,
        request_id: Option<String>,
    },

    /// A reasoning-class model produced no visible output
    #[error("Model '{model}' returned empty output after {attempts} attempt(s)")]
    EmptyReasoningOutput { model: String, attempts: u32 },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The document could not be read or converted to text
    #[error("Document error: {0}")]
    Document(String),

    /// The vendor answered 2xx with a body we could not interpret
    #[error("Invalid vendor response: {0}")]
    InvalidResponse(String),
}

impl LLMError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}

/// Exponential backoff schedule shared by transient and empty-output retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after the failed attempt `attempt` (0-based): 1s, 2s, 4s...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Duration::from_secs(1))
    }
}

/// Attempt-indexed effort table for reasoning models that come back empty.
///
/// Attempt 0 uses the requested effort (or `ReasoningEffort::DEFAULT` when unset); each later
/// attempt moves one level up. The table length is the attempt cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffortEscalation {
    levels: Vec<ReasoningEffort>,
}

impl EffortEscalation {
    pub fn new(requested: Option<ReasoningEffort>, max_attempts: u32) -> Self {
        let mut levels = Vec::with_capacity(max_attempts as usize);
        let mut current = requested.unwrap_or(ReasoningEffort::DEFAULT);
        for _ in 0..max_attempts.max(1) {
            levels.push(current);
            current = current.escalate();
        }
        Self { levels }
    }

    /// Effort for a 0-based attempt, `None` once the cap is reached
    pub fn effort_for(&self, attempt: u32) -> Option<ReasoningEffort> {
        self.levels.get(attempt as usize).copied()
    }

    pub fn max_attempts(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn levels(&self) -> &[ReasoningEffort] {
        &self.levels
    }
}
