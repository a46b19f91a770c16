// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provider Types - persisted descriptors and live health
//
// Descriptors are the only part of a provider that is ever written to disk.
// API keys stay in the secret manager / environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Vendor family of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    Google,
    Ollama,
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
}

impl ProviderType {
    pub const ALL: [ProviderType; 5] = [
        Self::OpenAI,
        Self::Anthropic,
        Self::Google,
        Self::Ollama,
        Self::OpenAICompatible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Ollama => "ollama",
            Self::OpenAICompatible => "openai-compatible",
        }
    }

    /// Locally hosted models: no API key, longer timeout
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama)
    }

    /// Environment variables checked, in order, when the secret manager has
    /// no key for this vendor
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAI => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Self::Ollama => &[],
            Self::OpenAICompatible => &["OPENAI_COMPATIBLE_API_KEY"],
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
            Self::Ollama => "http://localhost:11434",
            Self::OpenAICompatible => "http://localhost:8000/v1",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "ollama" | "local" => Ok(Self::Ollama),
            "openai-compatible" => Ok(Self::OpenAICompatible),
            other => Err(format!("Unsupported provider type: {}", other)),
        }
    }
}

/// Non-secret description of a registered provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique registry key (e.g. "openai-gpt4o", "claude-sonnet")
    pub name: String,

    pub provider_type: ProviderType,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// File-backed provider configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersDocument {
    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,
}

/// Startup probe outcome for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ProviderHealth {
    Ok,
    Error(String),
    /// Probe requested from inside a running async runtime; not executed
    Deferred,
    Unknown,
}

impl ProviderHealth {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Error(detail) => write!(f, "error: {}", detail),
            Self::Deferred => f.write_str("deferred"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Registry-wide health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    /// Default provider answered the probe
    Healthy,
    /// Default was switched to another healthy provider
    FailedOver,
    /// Every due probe was deferred; nothing is known to be broken
    Unverified,
    /// No provider answered the probe
    Critical,
    NoDefault,
}

/// Default-provider substitution made by the health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failover {
    pub from: String,
    pub to: String,
}

/// Result of a registry-wide health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub providers: BTreeMap<String, ProviderHealth>,
    pub default_provider: Option<String>,
    pub failover: Option<Failover>,
    pub status: RegistryStatus,
}

impl HealthReport {
    pub const STATUS_KEY: &'static str = "_status";
    pub const DEFAULT_KEY: &'static str = "_default";
    pub const FAILOVER_KEY: &'static str = "_failover";

    /// Flat view: one entry per provider plus the reserved `_`-prefixed keys
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .providers
            .iter()
            .map(|(name, health)| (name.clone(), health.to_string()))
            .collect();

        if let Some(default) = &self.default_provider {
            map.insert(Self::DEFAULT_KEY.to_string(), default.clone());
        }
        if let Some(failover) = &self.failover {
            map.insert(
                Self::FAILOVER_KEY.to_string(),
                format!("{} -> {}", failover.from, failover.to),
            );
        }
        match self.status {
            RegistryStatus::NoDefault => {
                map.insert(
                    Self::STATUS_KEY.to_string(),
                    "no default provider configured".to_string(),
                );
            }
            RegistryStatus::Critical => {
                map.insert(Self::STATUS_KEY.to_string(), "critical".to_string());
            }
            _ => {}
        }
        map
    }
}

/// Listing entry returned by `ProviderRegistry::describe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub identifier: String,
    pub is_default: bool,
    pub has_credentials: bool,
    pub health: ProviderHealth,
}
