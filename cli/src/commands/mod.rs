// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Gradeflow CLI

pub mod config;
pub mod grade;
pub mod providers;

pub use self::config::ConfigCommand;
pub use self::grade::GradeArgs;
pub use self::providers::ProvidersCommand;
