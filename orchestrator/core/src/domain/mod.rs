// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and ports of the grading core.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Completion Port, provider model, grading records and the
//!   persistence / secret / text-extraction ports

pub mod config;
pub mod document;
pub mod grading;
pub mod llm;
pub mod model_catalog;
pub mod provider;
pub mod repository;
pub mod secrets;
