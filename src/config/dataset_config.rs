//! Dataset preparation parameters parsed from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Dataset environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEnvConfig {
    pub window_size: usize,
    pub prediction_horizon: usize,
    pub split_ratio: f64,
}

impl Default for DatasetEnvConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            prediction_horizon: 5,
            split_ratio: 0.9,
        }
    }
}

impl DatasetEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            window_size: Self::parse_usize("WINDOW_SIZE", defaults.window_size)?,
            prediction_horizon: Self::parse_usize(
                "PREDICTION_HORIZON",
                defaults.prediction_horizon,
            )?,
            split_ratio: Self::parse_f64("SPLIT_RATIO", defaults.split_ratio)?,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {} - must be a positive integer", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {} - must be a number", key))
    }
}
