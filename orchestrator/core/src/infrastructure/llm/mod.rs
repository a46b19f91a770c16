// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates the domain Completion Port into one vendor's wire
// format. The registry owns the named instances.

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::{create_provider, ProviderRegistry, RegistryError};
