// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod llm;
pub mod prompt_templates;
pub mod provider_store;
pub mod repositories;
pub mod secrets_manager;
pub mod text_extraction;

pub use repositories::InMemoryGradingRepository;
pub use secrets_manager::SecretsManager;
