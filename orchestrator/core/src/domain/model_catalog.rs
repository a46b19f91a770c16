// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Static model-class lookup.
//!
//! Reasoning-class models reject `temperature` and take a `reasoning_effort`
//! level plus `max_completion_tokens`. Everything not listed here is standard.

use serde::{Deserialize, Serialize};

/// Model ids that belong to the reasoning class
const REASONING_MODELS: &[&str] = &[
    "o1",
    "o3",
    "o3-mini",
    "o3-pro",
    "o4-mini",
    "gpt-5",
    "gpt-5-mini",
    "gpt-5-nano",
    "gpt-5.1",
    "gpt-5.2",
    "deepseek-reasoner",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelClass {
    Standard,
    Reasoning,
}

impl ModelClass {
    pub fn of(model_id: &str) -> Self {
        if is_reasoning_model(model_id) {
            Self::Reasoning
        } else {
            Self::Standard
        }
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, Self::Reasoning)
    }
}

/// Matches `o3`, `o3-2025-04-16`, `openai/gpt-5-mini`; not `gpt-5-chat-latest`
/// style ids whose suffix names a different (standard) model.
pub fn is_reasoning_model(model_id: &str) -> bool {
    let id = model_id.trim().to_ascii_lowercase();
    let id = id.rsplit('/').next().unwrap_or(id.as_str());

    REASONING_MODELS.iter().any(|known| {
        id == *known
            || id
                .strip_prefix(known)
                .and_then(|rest| rest.strip_prefix('-'))
                .map(is_snapshot_suffix)
                .unwrap_or(false)
    })
}

/// Dated snapshot suffixes such as `2025-04-16` or `preview`
fn is_snapshot_suffix(rest: &str) -> bool {
    rest == "preview"
        || rest == "latest"
        || rest
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}
