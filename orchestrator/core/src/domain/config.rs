// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gradeflow Configuration
//
// YAML configuration for the provider registry, pipeline stage assignments,
// retry schedule and logging. Discovered from standard locations and then
// overridden from GRADEFLOW_* environment variables.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::grading::PipelineStage;
use crate::domain::llm::RetryPolicy;

pub const CONFIG_PATH_ENV: &str = "GRADEFLOW_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeflowConfig {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Persisted provider descriptors (JSON)
    #[serde(default = "default_providers_file")]
    pub providers_file: PathBuf,

    /// Skip local models on load and exclude them from the default
    #[serde(default)]
    pub disable_local_models: bool,

    /// Refuse defaults that could reach a live vendor without credentials
    #[serde(default)]
    pub testing_mode: bool,

    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,

    #[serde(default = "default_local_model")]
    pub local_model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Stage id -> provider name
    #[serde(default)]
    pub stage_providers: HashMap<PipelineStage, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_providers_file() -> PathBuf {
    PathBuf::from("./gradeflow-providers.json")
}

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "llama3".to_string()
}

fn default_max_attempts() -> u32 {
    RetryPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            providers_file: default_providers_file(),
            disable_local_models: false,
            testing_mode: false,
            local_base_url: default_local_base_url(),
            local_model: default_local_model(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl GradeflowConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Discover configuration file using precedence order
    /// 1. GRADEFLOW_CONFIG_PATH environment variable
    /// 2. ./gradeflow-config.yaml (working directory)
    /// 3. ~/.gradeflow/config.yaml (user home)
    /// 4. /etc/gradeflow/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./gradeflow-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".gradeflow").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/gradeflow/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    /// An explicit path must exist and parse.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply GRADEFLOW_* environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("GRADEFLOW_PROVIDERS_FILE") {
            tracing::info!("Environment override: GRADEFLOW_PROVIDERS_FILE={}", path);
            self.registry.providers_file = PathBuf::from(path);
        }
        if let Some(flag) = parse_flag(&lookup, "GRADEFLOW_DISABLE_LOCAL_MODELS") {
            self.registry.disable_local_models = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "GRADEFLOW_TESTING") {
            self.registry.testing_mode = flag;
        }
        if let Some(url) = lookup("GRADEFLOW_LOCAL_BASE_URL") {
            self.registry.local_base_url = url;
        }
        if let Some(level) = lookup("GRADEFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let val = lookup(key)?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                key,
                val
            );
            None
        }
    }
}
