//! Ensemble configuration
//!
//! Supports JSON configuration files describing:
//! - Run and step counts
//! - Worker pool size and progress reporting
//! - Seed for reproducible per-run random generators
//! - Variable declarations with their default values

use serde::{Deserialize, Serialize};
use std::path::Path;
use subsim_core::VariableDecl;
use thiserror::Error;

/// Environment override for the worker count when the config leaves it unset
pub const WORKERS_ENV: &str = "SUBSIM_WORKERS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Root configuration for an ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of independent runs
    pub run_count: usize,

    /// Steps per run
    pub step_count: usize,

    /// Worker threads (default: `SUBSIM_WORKERS`, then CPU count)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Emit "completed i of N" progress
    #[serde(default = "default_report_progress")]
    pub report_progress: bool,

    /// Base seed; run `i` draws from a generator seeded with `seed + i`
    #[serde(default)]
    pub seed: Option<u64>,

    /// Variables shared by every run
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
}

fn default_report_progress() -> bool {
    true
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            run_count: 100,
            step_count: 50,
            workers: None,
            report_progress: default_report_progress(),
            seed: None,
            variables: Vec::new(),
        }
    }
}

impl EnsembleConfig {
    pub fn new(run_count: usize, step_count: usize) -> Self {
        Self {
            run_count,
            step_count,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_variables(mut self, variables: impl IntoIterator<Item = VariableDecl>) -> Self {
        self.variables = variables.into_iter().collect();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.report_progress = enabled;
        self
    }

    /// Effective worker count, never zero
    pub fn resolved_workers(&self) -> usize {
        self.workers
            .or_else(|| {
                std::env::var(WORKERS_ENV)
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
            })
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }
}
