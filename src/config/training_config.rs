//! Model and training loop parameters parsed from environment variables.

use crate::domain::ml::model::{DEFAULT_HIDDEN_UNITS, DEFAULT_LEARNING_RATE};
use anyhow::{Context, Result};
use std::env;

/// Training environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingEnvConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub progress_throttle_ms: u64,
    pub yield_every_epochs: usize,
}

impl Default for TrainingEnvConfig {
    fn default() -> Self {
        Self {
            epochs: 12,
            batch_size: 256,
            hidden_units: DEFAULT_HIDDEN_UNITS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
            progress_throttle_ms: 500,
            yield_every_epochs: 3,
        }
    }
}

impl TrainingEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            epochs: Self::parse_usize("EPOCHS", defaults.epochs)?,
            batch_size: Self::parse_usize("BATCH_SIZE", defaults.batch_size)?,
            hidden_units: Self::parse_usize("HIDDEN_UNITS", defaults.hidden_units)?,
            learning_rate: Self::parse_f64("LEARNING_RATE", defaults.learning_rate)?,
            seed: Self::parse_u64("MODEL_SEED", defaults.seed)?,
            progress_throttle_ms: Self::parse_u64(
                "PROGRESS_THROTTLE_MS",
                defaults.progress_throttle_ms,
            )?,
            yield_every_epochs: Self::parse_usize(
                "YIELD_EVERY_EPOCHS",
                defaults.yield_every_epochs,
            )?,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {} - must be a non-negative integer", key))
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {} - must be a non-negative integer", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {} - must be a number", key))
    }
}
