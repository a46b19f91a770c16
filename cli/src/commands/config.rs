// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gradeflow_core::domain::config::{GradeflowConfig, CONFIG_PATH_ENV};

use crate::context::{print_json, CoreContext};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file + environment overrides)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration: file syntax and stage assignments
    Validate,

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./gradeflow-config.yaml)
        #[arg(short, long, default_value = "./gradeflow-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
    config: &GradeflowConfig,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, config, paths),
        ConfigCommand::Validate => validate(config),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, config: &GradeflowConfig, show_paths: bool) -> Result<()> {
    if show_paths {
        eprintln!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => eprintln!("  1. --config flag: {}", path.display()),
            None => eprintln!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        eprintln!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        eprintln!("  3. ./gradeflow-config.yaml");
        eprintln!("  4. ~/.gradeflow/config.yaml");
        eprintln!("  5. /etc/gradeflow/config.yaml");
        eprintln!();
    }

    print_json(config)
}

fn validate(config: &GradeflowConfig) -> Result<()> {
    eprintln!("Validating configuration...");

    if config.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be at least 1");
    }

    if !config.pipeline.stage_providers.is_empty() {
        let registry = CoreContext::new().load_registry(config)?;
        for (stage, name) in &config.pipeline.stage_providers {
            if !registry.contains(name) {
                bail!("Stage {} is assigned to unknown provider '{}'", stage, name);
            }
        }
    }

    eprintln!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    GradeflowConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    eprintln!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gradeflow-config.yaml");

        generate(output.clone(), false).unwrap();
        assert!(generate(output.clone(), false).is_err());
        generate(output.clone(), true).unwrap();

        let loaded = GradeflowConfig::from_yaml_file(&output).unwrap();
        assert_eq!(loaded, GradeflowConfig::default());
    }
}
