//! Configuration module for the forecaster.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Dataset, Training, and Observability.

mod dataset_config;
mod observability_config;
mod training_config;

pub use dataset_config::DatasetEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use training_config::TrainingEnvConfig;

use crate::application::ml::training_orchestrator::OrchestratorSettings;
use crate::domain::ml::model::ModelTopology;
use anyhow::{Context, Result, ensure};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Dataset (from DatasetEnvConfig)
    pub window_size: usize,
    pub prediction_horizon: usize,
    pub split_ratio: f64,

    // Training (from TrainingEnvConfig)
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub progress_throttle_ms: u64,
    pub yield_every_epochs: usize,

    // Observability (from ObservabilityEnvConfig)
    pub observability_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::compose(
            DatasetEnvConfig::default(),
            TrainingEnvConfig::default(),
            ObservabilityEnvConfig::default(),
        )
    }
}

impl Config {
    /// Load configuration from environment variables and validate it.
    pub fn from_env() -> Result<Self> {
        let dataset = DatasetEnvConfig::from_env().context("Failed to load dataset config")?;
        let training = TrainingEnvConfig::from_env().context("Failed to load training config")?;
        let observability = ObservabilityEnvConfig::from_env();

        let config = Self::compose(dataset, training, observability);
        config.validate()?;
        Ok(config)
    }

    fn compose(
        dataset: DatasetEnvConfig,
        training: TrainingEnvConfig,
        observability: ObservabilityEnvConfig,
    ) -> Self {
        Self {
            window_size: dataset.window_size,
            prediction_horizon: dataset.prediction_horizon,
            split_ratio: dataset.split_ratio,

            epochs: training.epochs,
            batch_size: training.batch_size,
            hidden_units: training.hidden_units,
            learning_rate: training.learning_rate,
            seed: training.seed,
            progress_throttle_ms: training.progress_throttle_ms,
            yield_every_epochs: training.yield_every_epochs,

            observability_enabled: observability.enabled,
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.window_size > 0, "WINDOW_SIZE must be positive");
        ensure!(
            self.prediction_horizon > 0,
            "PREDICTION_HORIZON must be positive"
        );
        ensure!(
            self.split_ratio > 0.0 && self.split_ratio < 1.0,
            "SPLIT_RATIO must be between 0 and 1 (exclusive), got {}",
            self.split_ratio
        );
        ensure!(self.batch_size > 0, "BATCH_SIZE must be positive");
        ensure!(self.hidden_units > 0, "HIDDEN_UNITS must be positive");
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "LEARNING_RATE must be positive, got {}",
            self.learning_rate
        );
        Ok(())
    }

    pub fn topology(&self) -> ModelTopology {
        ModelTopology::new(self.window_size, self.prediction_horizon)
            .with_hidden_units(self.hidden_units)
            .with_learning_rate(self.learning_rate)
            .with_seed(self.seed)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            progress_interval: Duration::from_millis(self.progress_throttle_ms),
            yield_every: self.yield_every_epochs,
        }
    }
}
