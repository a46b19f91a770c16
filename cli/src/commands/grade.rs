// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Full correction run for one student

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use gradeflow_core::application::{CorrectionPipeline, GradingRun};
use gradeflow_core::domain::config::GradeflowConfig;
use gradeflow_core::domain::grading::{PipelineStage, RunStatus};
use gradeflow_core::domain::provider::RegistryStatus;
use gradeflow_core::infrastructure::repositories::InMemoryGradingRepository;

use crate::context::{print_json, CoreContext};

#[derive(Args)]
pub struct GradeArgs {
    /// Answer key (gabarito): image, PDF or text file
    #[arg(long, value_name = "FILE")]
    pub answer_key: PathBuf,

    /// Student's answered exam
    #[arg(long, value_name = "FILE")]
    pub submission: PathBuf,

    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub student_id: String,

    #[arg(long)]
    pub student_name: String,

    /// Route a stage to a provider, e.g. `grade_question=claude-sonnet`.
    /// Repeatable; overrides the config file.
    #[arg(long = "stage-provider", value_name = "STAGE=NAME", value_parser = parse_stage_assignment)]
    pub stage_providers: Vec<(PipelineStage, String)>,

    /// Skip the startup health probe
    #[arg(long)]
    pub no_probe: bool,
}

pub fn parse_stage_assignment(raw: &str) -> Result<(PipelineStage, String)> {
    let (stage, name) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected STAGE=NAME, got '{}'", raw))?;
    let stage = stage.trim().parse::<PipelineStage>().map_err(|e| anyhow!(e))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("missing provider name in '{}'", raw);
    }
    Ok((stage, name.to_string()))
}

pub async fn execute(args: GradeArgs, config: &GradeflowConfig) -> Result<()> {
    let context = CoreContext::new();
    let registry = context.load_registry(config)?;

    if !args.no_probe {
        let report = registry.probe_health().await;
        if report.status == RegistryStatus::Critical {
            bail!("No provider passed the health probe: {:?}", report.to_map());
        }
    }

    let pipeline = CorrectionPipeline::new(
        Arc::new(registry),
        Arc::new(InMemoryGradingRepository::new()),
    )
    .with_stage_providers(&config.pipeline.stage_providers)
    .context("Invalid stage assignment in configuration")?;
    for (stage, name) in &args.stage_providers {
        pipeline.set_stage_provider(*stage, name)?;
    }

    let run = GradingRun {
        answer_key: args.answer_key,
        submission: args.submission,
        subject: args.subject,
        student_id: args.student_id,
        student_name: args.student_name,
    };
    let report = pipeline.run_full_pipeline(&run).await;
    print_json(&report)?;

    info!(status = ?report.status, errors = report.errors.len(), "Grading finished");
    if report.status == RunStatus::Aborted {
        bail!("Correction pipeline aborted: {}", report.errors.join("; "));
    }
    Ok(())
}
