// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provider registry commands
//!
//! Commands: list, add, remove, set-default, health

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::json;

use gradeflow_core::domain::config::GradeflowConfig;
use gradeflow_core::domain::provider::{ProviderDescriptor, ProviderType, RegistryStatus};
use gradeflow_core::domain::secrets::resolve_api_key;
use gradeflow_core::infrastructure::llm::create_provider;

use crate::context::{print_json, CoreContext};

#[derive(Subcommand)]
pub enum ProvidersCommand {
    /// List registered providers
    List,

    /// Register a provider and persist its descriptor
    Add {
        /// Unique registry name
        #[arg(long)]
        name: String,

        /// Vendor: openai, anthropic, google, ollama, openai-compatible
        #[arg(long = "type", value_name = "VENDOR")]
        provider_type: ProviderType,

        /// Model id sent to the vendor
        #[arg(long)]
        model: String,

        /// Endpoint override (required for openai-compatible)
        #[arg(long)]
        base_url: Option<String>,

        /// Make it the default provider
        #[arg(long)]
        default: bool,
    },

    /// Remove a provider
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Change the default provider
    SetDefault {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Probe every hosted provider and fail the default over if needed
    Health,
}

pub async fn handle_command(command: ProvidersCommand, config: &GradeflowConfig) -> Result<()> {
    let context = CoreContext::new();
    let registry = context.load_registry(config)?;

    match command {
        ProvidersCommand::List => print_json(&registry.describe()),
        ProvidersCommand::Add {
            name,
            provider_type,
            model,
            base_url,
            default,
        } => {
            let descriptor = ProviderDescriptor {
                name: name.clone(),
                provider_type,
                model,
                base_url,
            };
            let api_key = resolve_api_key(&context.secrets, provider_type);
            if api_key.is_none() && !provider_type.is_local() {
                tracing::warn!(
                    "No API key found for {} (checked {}); calls will fail until one is set",
                    provider_type,
                    provider_type.api_key_env_vars().join(", ")
                );
            }
            let adapter = create_provider(
                &descriptor,
                api_key,
                &config.registry,
                config.retry.policy(),
                context.extractor.clone(),
            )?;
            registry
                .register(&name, adapter, default)
                .with_context(|| format!("Failed to register provider '{}'", name))?;
            print_json(&registry.describe())
        }
        ProvidersCommand::Remove { name } => {
            if !registry.unregister(&name)? {
                bail!("Unknown provider: {}", name);
            }
            print_json(&json!({ "removed": name, "default_provider": registry.default_name() }))
        }
        ProvidersCommand::SetDefault { name } => {
            if !registry.set_default(&name)? {
                bail!("Unknown provider: {}", name);
            }
            print_json(&json!({ "default_provider": name }))
        }
        ProvidersCommand::Health => {
            let report = registry.probe_health().await;
            print_json(&report.to_map())?;
            if report.status == RegistryStatus::Critical {
                bail!("No provider passed the health probe");
            }
            Ok(())
        }
    }
}
