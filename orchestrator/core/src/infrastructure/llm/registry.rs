// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - named adapters, default pointer and live health
//
// Built once at startup and handed to the pipeline by reference. Descriptors
// (never keys) are persisted through the ProviderStore; keys are resolved per
// vendor through the SecretStore with environment fallback.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::anthropic::AnthropicAdapter;
use super::gemini::GeminiAdapter;
use super::http::truncate_chars;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;
use crate::domain::config::RegistrySettings;
use crate::domain::document::TextExtractor;
use crate::domain::llm::{CompletionRequest, LLMProvider, ReasoningEffort, RetryPolicy};
use crate::domain::model_catalog::ModelClass;
use crate::domain::provider::{
    Failover, HealthReport, ProviderDescriptor, ProviderHealth, ProviderInfo, ProviderType,
    ProvidersDocument, RegistryStatus,
};
use crate::domain::secrets::{resolve_api_key, SecretStore};
use crate::infrastructure::provider_store::{ProviderStore, ProviderStoreError};

/// Probe prompt and the token the reply must contain
pub const PROBE_PROMPT: &str = "Reply with exactly: OK";
pub const PROBE_EXPECTED: &str = "OK";
const PROBE_MAX_TOKENS: u32 = 16;
/// Reasoning models spend hidden tokens before answering
const PROBE_MAX_TOKENS_REASONING: u32 = 256;

/// Cheap tier first; the first one registered becomes the default
const DEFAULT_TIERS: &[(ProviderType, &str, &str)] = &[
    (ProviderType::OpenAI, "openai-gpt4o-mini", "gpt-4o-mini"),
    (ProviderType::OpenAI, "openai-gpt4o", "gpt-4o"),
    (ProviderType::Anthropic, "claude-haiku", "claude-haiku-4-5-20251001"),
    (ProviderType::Anthropic, "claude-sonnet", "claude-sonnet-4-5-20250929"),
    (ProviderType::Google, "gemini-flash", "gemini-2.5-flash"),
    (ProviderType::Google, "gemini-pro", "gemini-2.5-pro"),
];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("No default provider configured")]
    NoDefaultProvider,

    #[error(transparent)]
    Store(#[from] ProviderStoreError),

    #[error("Cannot construct provider '{name}': {reason}")]
    Construction { name: String, reason: String },
}

struct RegisteredProvider {
    name: String,
    descriptor: ProviderDescriptor,
    adapter: Arc<dyn LLMProvider>,
}

#[derive(Default)]
struct RegistryState {
    /// Registration order matters for default reassignment and failover
    entries: Vec<RegisteredProvider>,
    default: Option<String>,
    health: HashMap<String, ProviderHealth>,
    last_report: Option<HealthReport>,
    /// Entries were synthesized at load and the store does not hold them yet
    unsaved_defaults: bool,
}

impl RegistryState {
    fn find(&self, name: &str) -> Option<&RegisteredProvider> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Registry of named LLM providers
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    store: Option<ProviderStore>,
    testing_mode: bool,
    disable_local_models: bool,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Empty, in-memory registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            store: None,
            testing_mode: false,
            disable_local_models: false,
        }
    }

    /// Persist registrations through `store`
    pub fn with_store(mut self, store: ProviderStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_testing_mode(mut self, enabled: bool) -> Self {
        self.testing_mode = enabled;
        self
    }

    pub fn with_local_models_disabled(mut self, disabled: bool) -> Self {
        self.disable_local_models = disabled;
        self
    }

    /// Build the registry from the persisted provider config.
    ///
    /// Descriptors of a disabled local model class are skipped. When nothing
    /// is persisted a default set is synthesized from available credentials.
    /// Synthesized providers are only written back once the registry is
    /// changed, and then as a whole set.
    pub fn load(
        settings: &RegistrySettings,
        secrets: &dyn SecretStore,
        retry: RetryPolicy,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self, RegistryError> {
        let store = ProviderStore::new(&settings.providers_file);
        let document = store.load()?;
        let registry = Self::new()
            .with_store(store)
            .with_testing_mode(settings.testing_mode)
            .with_local_models_disabled(settings.disable_local_models);

        info!(
            providers = document.providers.len(),
            path = ?settings.providers_file,
            "Initializing LLM provider registry"
        );

        for descriptor in &document.providers {
            if descriptor.provider_type.is_local() && settings.disable_local_models {
                info!("Local provider '{}' disabled, skipping", descriptor.name);
                continue;
            }
            let api_key = resolve_api_key(secrets, descriptor.provider_type);
            match create_provider(descriptor, api_key, settings, retry, extractor.clone()) {
                Ok(adapter) => {
                    registry.insert(descriptor.clone(), adapter, false);
                }
                Err(e) => warn!("Failed to initialize provider '{}': {}", descriptor.name, e),
            }
        }

        if document.providers.is_empty() {
            registry.synthesize_defaults(settings, secrets, retry, extractor);
            let mut state = registry.state.write();
            let synthesized = !state.entries.is_empty();
            state.unsaved_defaults = synthesized;
        } else if let Some(default) = &document.default_provider {
            let mut state = registry.state.write();
            if state.find(default).is_some() {
                state.default = Some(default.clone());
            } else {
                warn!("Persisted default provider '{}' is not available", default);
            }
        }

        if registry.state.read().entries.is_empty() {
            warn!("No LLM providers configured - grading stages will fail until one is added");
        }
        Ok(registry)
    }

    fn synthesize_defaults(
        &self,
        settings: &RegistrySettings,
        secrets: &dyn SecretStore,
        retry: RetryPolicy,
        extractor: Arc<dyn TextExtractor>,
    ) {
        let mut keys: HashMap<ProviderType, Option<String>> = HashMap::new();
        for (vendor, name, model) in DEFAULT_TIERS {
            let api_key = keys
                .entry(*vendor)
                .or_insert_with(|| resolve_api_key(secrets, *vendor))
                .clone();
            let Some(api_key) = api_key else { continue };

            let descriptor = ProviderDescriptor {
                name: name.to_string(),
                provider_type: *vendor,
                model: model.to_string(),
                base_url: None,
            };
            if let Ok(adapter) =
                create_provider(&descriptor, Some(api_key), settings, retry, extractor.clone())
            {
                info!("Registering default provider {} ({})", name, model);
                self.insert(descriptor, adapter, false);
            }
        }

        if !settings.disable_local_models {
            let descriptor = ProviderDescriptor {
                name: format!("ollama-{}", settings.local_model),
                provider_type: ProviderType::Ollama,
                model: settings.local_model.clone(),
                base_url: Some(settings.local_base_url.clone()),
            };
            if let Ok(adapter) = create_provider(&descriptor, None, settings, retry, extractor) {
                self.insert(descriptor, adapter, false);
            }
        }
    }

    /// Register (or replace) a provider and persist its descriptor.
    /// The first registered provider becomes the default.
    pub fn register(
        &self,
        name: &str,
        adapter: Arc<dyn LLMProvider>,
        set_default: bool,
    ) -> Result<(), RegistryError> {
        let descriptor = ProviderDescriptor {
            name: name.to_string(),
            provider_type: adapter.provider_type(),
            model: adapter.model().to_string(),
            base_url: adapter.base_url().map(str::to_string),
        };
        let is_default = self.insert(descriptor.clone(), adapter, set_default);
        self.persist(|store| store.upsert(descriptor, is_default))
    }

    /// In-memory registration. Returns whether the provider is now the default.
    fn insert(
        &self,
        descriptor: ProviderDescriptor,
        adapter: Arc<dyn LLMProvider>,
        set_default: bool,
    ) -> bool {
        let name = descriptor.name.clone();
        let mut state = self.state.write();
        match state.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => {
                debug!("Replacing provider '{}'", name);
                existing.descriptor = descriptor;
                existing.adapter = adapter;
            }
            None => state.entries.push(RegisteredProvider {
                name: name.clone(),
                descriptor,
                adapter,
            }),
        }
        state.health.insert(name.clone(), ProviderHealth::Unknown);
        if set_default || state.default.is_none() {
            state.default = Some(name.clone());
        }
        state.default.as_deref() == Some(name.as_str())
    }

    /// Write a change through to the store. While the entries are still the
    /// unsaved synthesized set, the whole set (already carrying the change)
    /// is written instead of `change`.
    fn persist(
        &self,
        change: impl FnOnce(&ProviderStore) -> Result<(), ProviderStoreError>,
    ) -> Result<(), RegistryError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let snapshot = {
            let mut state = self.state.write();
            if std::mem::take(&mut state.unsaved_defaults) {
                Some(ProvidersDocument {
                    default_provider: state.default.clone(),
                    providers: state.entries.iter().map(|e| e.descriptor.clone()).collect(),
                })
            } else {
                None
            }
        };

        match snapshot {
            Some(document) => {
                info!(
                    providers = document.providers.len(),
                    path = ?store.path(),
                    "Persisting synthesized provider set"
                );
                if let Err(e) = store.save(&document) {
                    self.state.write().unsaved_defaults = true;
                    return Err(e.into());
                }
            }
            None => change(store)?,
        }
        Ok(())
    }

    /// Remove a provider. Removing the default hands the role to the first
    /// remaining provider, if any.
    pub fn unregister(&self, name: &str) -> Result<bool, RegistryError> {
        let new_default = {
            let mut state = self.state.write();
            let before = state.entries.len();
            state.entries.retain(|e| e.name != name);
            if state.entries.len() == before {
                return Ok(false);
            }
            state.health.remove(name);
            if state.default.as_deref() == Some(name) {
                state.default = state.entries.first().map(|e| e.name.clone());
                info!(removed = name, new_default = ?state.default, "Default provider reassigned");
            }
            state.default.clone()
        };

        self.persist(|store| store.remove(name, new_default.as_deref()))?;
        Ok(true)
    }

    /// Point the default at a registered provider; `false` if unknown
    pub fn set_default(&self, name: &str) -> Result<bool, RegistryError> {
        {
            let mut state = self.state.write();
            if state.find(name).is_none() {
                return Ok(false);
            }
            state.default = Some(name.to_string());
        }
        self.persist(|store| store.set_default(Some(name)))?;
        Ok(true)
    }

    /// Provider by name, or the default when `name` is `None`
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn LLMProvider>, RegistryError> {
        match name {
            Some(name) => self
                .state
                .read()
                .find(name)
                .map(|e| e.adapter.clone())
                .ok_or_else(|| RegistryError::UnknownProvider(name.to_string())),
            None => self.get_default().ok_or(RegistryError::NoDefaultProvider),
        }
    }

    /// Default provider. In testing mode a default that lacks credentials,
    /// or is a disabled local model, is withheld.
    pub fn get_default(&self) -> Option<Arc<dyn LLMProvider>> {
        let state = self.state.read();
        let name = state.default.as_deref()?;
        let adapter = state.find(name)?.adapter.clone();
        if self.withheld_in_testing(adapter.as_ref()) {
            warn!(provider = name, "Testing mode: default provider withheld");
            return None;
        }
        Some(adapter)
    }

    fn withheld_in_testing(&self, adapter: &dyn LLMProvider) -> bool {
        if !self.testing_mode {
            return false;
        }
        if adapter.provider_type().is_local() {
            self.disable_local_models
        } else {
            !adapter.has_credentials()
        }
    }

    pub fn default_name(&self) -> Option<String> {
        self.state.read().default.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().find(name).is_some()
    }

    /// Provider names in registration order
    pub fn list(&self) -> Vec<String> {
        self.state.read().entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn describe(&self) -> Vec<ProviderInfo> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .map(|e| ProviderInfo {
                name: e.name.clone(),
                provider_type: e.adapter.provider_type(),
                model: e.adapter.model().to_string(),
                base_url: e.adapter.base_url().map(str::to_string),
                identifier: e.adapter.identifier(),
                is_default: state.default.as_deref() == Some(e.name.as_str()),
                has_credentials: e.adapter.has_credentials(),
                health: state
                    .health
                    .get(&e.name)
                    .cloned()
                    .unwrap_or(ProviderHealth::Unknown),
            })
            .collect()
    }

    /// Last probe outcome, if a probe has run
    pub fn last_health_report(&self) -> Option<HealthReport> {
        self.state.read().last_report.clone()
    }

    /// Probe every non-local provider and fail the default over to the first
    /// healthy one when needed. Local providers are reported `unknown`.
    pub async fn probe_health(&self) -> HealthReport {
        let snapshot: Vec<(String, Arc<dyn LLMProvider>)> = self
            .state
            .read()
            .entries
            .iter()
            .map(|e| (e.name.clone(), e.adapter.clone()))
            .collect();

        let mut results = Vec::with_capacity(snapshot.len());
        for (name, adapter) in snapshot {
            let health = if adapter.provider_type().is_local() {
                ProviderHealth::Unknown
            } else {
                info!("Health checking provider: {}", name);
                probe(adapter.as_ref()).await
            };
            results.push((name, health));
        }
        self.apply_health(results)
    }

    /// Synchronous entry point. Inside a running async runtime the probes are
    /// not run (blocking there would deadlock) and report `deferred`.
    pub fn probe_health_blocking(&self) -> HealthReport {
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!("Health probe requested inside an async runtime; deferring");
            let results = self
                .state
                .read()
                .entries
                .iter()
                .map(|e| {
                    let health = if e.adapter.provider_type().is_local() {
                        ProviderHealth::Unknown
                    } else {
                        ProviderHealth::Deferred
                    };
                    (e.name.clone(), health)
                })
                .collect();
            return self.apply_health(results);
        }

        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.probe_health()),
            Err(e) => {
                error!("Cannot start runtime for health probe: {}", e);
                let results = self
                    .list()
                    .into_iter()
                    .map(|name| (name, ProviderHealth::Error(format!("probe not run: {}", e))))
                    .collect();
                self.apply_health(results)
            }
        }
    }

    fn apply_health(&self, results: Vec<(String, ProviderHealth)>) -> HealthReport {
        let mut state = self.state.write();
        for (name, health) in &results {
            state.health.insert(name.clone(), health.clone());
        }

        let providers: BTreeMap<String, ProviderHealth> = results.iter().cloned().collect();
        let mut failover = None;
        let status = match state.default.clone() {
            None => RegistryStatus::NoDefault,
            Some(current) if providers.get(&current).is_some_and(ProviderHealth::is_ok) => {
                RegistryStatus::Healthy
            }
            Some(current) => {
                let replacement = results
                    .iter()
                    .find(|(name, health)| *name != current && health.is_ok())
                    .map(|(name, _)| name.clone());
                match replacement {
                    Some(to) => {
                        warn!(
                            from = %current,
                            to = %to,
                            health = %providers.get(&current).cloned().unwrap_or(ProviderHealth::Unknown),
                            "Default provider failed health probe, failing over"
                        );
                        state.default = Some(to.clone());
                        failover = Some(Failover { from: current, to });
                        RegistryStatus::FailedOver
                    }
                    None if probes_deferred(&results) => RegistryStatus::Unverified,
                    None => {
                        error!("No LLM provider passed the health probe");
                        RegistryStatus::Critical
                    }
                }
            }
        };

        let report = HealthReport {
            providers,
            default_provider: state.default.clone(),
            failover,
            status,
        };
        state.last_report = Some(report.clone());
        report
    }
}

/// Every probe that was due got deferred, so nothing is known yet. Local
/// providers are never probed and do not count.
fn probes_deferred(results: &[(String, ProviderHealth)]) -> bool {
    let mut due = results
        .iter()
        .filter(|(_, h)| !matches!(h, ProviderHealth::Unknown))
        .peekable();
    due.peek().is_some() && due.all(|(_, h)| matches!(h, ProviderHealth::Deferred))
}

async fn probe(adapter: &dyn LLMProvider) -> ProviderHealth {
    let mut request = CompletionRequest::new(PROBE_PROMPT).with_temperature(0.0);
    request = if ModelClass::of(adapter.model()).is_reasoning() {
        request
            .with_max_tokens(PROBE_MAX_TOKENS_REASONING)
            .with_reasoning_effort(ReasoningEffort::DEFAULT)
    } else {
        request.with_max_tokens(PROBE_MAX_TOKENS)
    };

    match adapter.complete(&request).await {
        Ok(response) if response.content.to_uppercase().contains(PROBE_EXPECTED) => {
            ProviderHealth::Ok
        }
        Ok(response) => ProviderHealth::Error(format!(
            "unexpected probe reply: {:?}",
            truncate_chars(&response.content, 80)
        )),
        Err(e) => ProviderHealth::Error(e.to_string()),
    }
}

/// Construct the adapter for a descriptor
pub fn create_provider(
    descriptor: &ProviderDescriptor,
    api_key: Option<String>,
    settings: &RegistrySettings,
    retry: RetryPolicy,
    extractor: Arc<dyn TextExtractor>,
) -> Result<Arc<dyn LLMProvider>, RegistryError> {
    let model = descriptor.model.clone();
    let base_url = descriptor.base_url.clone();

    let provider: Arc<dyn LLMProvider> = match descriptor.provider_type {
        ProviderType::OpenAI => {
            let adapter = OpenAIAdapter::new(api_key, model, extractor).with_retry_policy(retry);
            Arc::new(match base_url {
                Some(url) => adapter.with_base_url(url),
                None => adapter,
            })
        }
        ProviderType::OpenAICompatible => {
            let url = base_url.ok_or_else(|| RegistryError::Construction {
                name: descriptor.name.clone(),
                reason: "openai-compatible providers need a base_url".to_string(),
            })?;
            Arc::new(OpenAIAdapter::compatible(url, api_key, model, extractor).with_retry_policy(retry))
        }
        ProviderType::Anthropic => {
            let adapter = AnthropicAdapter::new(api_key, model, extractor).with_retry_policy(retry);
            Arc::new(match base_url {
                Some(url) => adapter.with_base_url(url),
                None => adapter,
            })
        }
        ProviderType::Google => {
            let adapter = GeminiAdapter::new(api_key, model, extractor).with_retry_policy(retry);
            Arc::new(match base_url {
                Some(url) => adapter.with_base_url(url),
                None => adapter,
            })
        }
        ProviderType::Ollama => {
            let url = base_url.unwrap_or_else(|| settings.local_base_url.clone());
            Arc::new(OllamaAdapter::new(url, model, extractor).with_retry_policy(retry))
        }
    };

    Ok(provider)
}
