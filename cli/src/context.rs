// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Core wiring shared by the command handlers

use anyhow::{Context, Result};
use std::sync::Arc;

use gradeflow_core::domain::config::GradeflowConfig;
use gradeflow_core::domain::document::TextExtractor;
use gradeflow_core::infrastructure::llm::ProviderRegistry;
use gradeflow_core::infrastructure::secrets_manager::SecretsManager;
use gradeflow_core::infrastructure::text_extraction::DocumentTextExtractor;

/// Services needed to build or extend the provider registry
pub struct CoreContext {
    pub secrets: SecretsManager,
    pub extractor: Arc<dyn TextExtractor>,
}

impl CoreContext {
    /// Secrets come from vendor environment variables only
    pub fn new() -> Self {
        Self {
            secrets: SecretsManager::new(),
            extractor: Arc::new(DocumentTextExtractor::new()),
        }
    }

    pub fn load_registry(&self, config: &GradeflowConfig) -> Result<ProviderRegistry> {
        ProviderRegistry::load(
            &config.registry,
            &self.secrets,
            config.retry.policy(),
            self.extractor.clone(),
        )
        .with_context(|| {
            format!(
                "Failed to load providers from {}",
                config.registry.providers_file.display()
            )
        })
    }
}

impl Default for CoreContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
