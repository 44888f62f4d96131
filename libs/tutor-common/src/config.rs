// Grader configuration: JSON file defaults with environment overrides
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/grader.json";

/// Resource limits and behaviour switches for one grading run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    /// Wall-clock budget per test case
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub max_stack_kb: u32,
    pub max_source_bytes: usize,
    /// Record harness progress lines ("--- Starting Test Case N ---", ...) in each result's logs
    pub trace_harness: bool,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            memory_limit_mb: 256,
            max_stack_kb: 1024,
            max_source_bytes: 1024 * 1024,
            trace_harness: true,
        }
    }
}

impl GraderConfig {
    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load `config/grader.json` when present, fall back to defaults,
    /// then apply `GRADER_*` environment overrides.
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            tracing::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Self::default()
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("GRADER_TIMEOUT_MS") {
            self.timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid GRADER_TIMEOUT_MS: {}", raw))?;
        }
        if let Some(raw) = lookup("GRADER_MEMORY_LIMIT_MB") {
            self.memory_limit_mb = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid GRADER_MEMORY_LIMIT_MB: {}", raw))?;
        }
        if let Some(raw) = lookup("GRADER_TRACE_HARNESS") {
            self.trace_harness = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    pub fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb as usize * 1024 * 1024
    }

    pub fn max_stack_bytes(&self) -> usize {
        self.max_stack_kb as usize * 1024
    }
}
