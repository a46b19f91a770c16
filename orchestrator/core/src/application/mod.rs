// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod correction_pipeline;
pub mod response_interpreter;
pub mod stage_outputs;

// Re-export use cases for convenience
pub use correction_pipeline::{CorrectionPipeline, GradingRun, PipelineError};
pub use response_interpreter::{extract_json_object, ResponseParseError};
