// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gradeflow Core
//!
//! LLM provider abstraction and correction pipeline for exam grading.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** One completion interface over several LLM vendors, a
//!   registry with health probing and failover, and the staged grading
//!   pipeline built on top of them
//!
//! ```text
//! CorrectionPipeline ─► ProviderRegistry ─► LLMProvider (openai | anthropic | gemini | ollama)
//!        │                                         │
//!        └──► response_interpreter ◄───────────────┘
//!        └──► GradingRepository
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
