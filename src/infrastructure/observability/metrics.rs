//! Prometheus metrics definitions for the forecaster
//!
//! All metrics use the `forecast_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the forecasting pipeline
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Training runs by outcome (completed/failed/rejected)
    pub training_runs_total: CounterVec,
    /// Epochs completed across all runs
    pub epochs_trained_total: Counter,
    /// Loss of the most recent epoch
    pub training_loss: GenericGauge<AtomicF64>,
    /// Predictions served by quality (ok/degraded)
    pub predictions_total: CounterVec,
    /// Model (re)builds
    pub model_builds_total: Counter,
    /// RMSE of the latest evaluation
    pub evaluation_rmse: GenericGauge<AtomicF64>,
    /// Observations in the loaded series
    pub series_length: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let training_runs_total = CounterVec::new(
            Opts::new("forecast_training_runs_total", "Training runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(training_runs_total.clone()))?;

        let epochs_trained_total = Counter::with_opts(Opts::new(
            "forecast_epochs_trained_total",
            "Epochs completed across all training runs",
        ))?;
        registry.register(Box::new(epochs_trained_total.clone()))?;

        let training_loss = Gauge::with_opts(Opts::new(
            "forecast_training_loss",
            "Loss of the most recent training epoch",
        ))?;
        registry.register(Box::new(training_loss.clone()))?;

        let predictions_total = CounterVec::new(
            Opts::new("forecast_predictions_total", "Predictions served by quality"),
            &["quality"],
        )?;
        registry.register(Box::new(predictions_total.clone()))?;

        let model_builds_total = Counter::with_opts(Opts::new(
            "forecast_model_builds_total",
            "Model builds and rebuilds",
        ))?;
        registry.register(Box::new(model_builds_total.clone()))?;

        let evaluation_rmse = Gauge::with_opts(Opts::new(
            "forecast_evaluation_rmse",
            "RMSE of the latest evaluation on the test split",
        ))?;
        registry.register(Box::new(evaluation_rmse.clone()))?;

        let series_length = Gauge::with_opts(Opts::new(
            "forecast_series_length",
            "Observations in the loaded price series",
        ))?;
        registry.register(Box::new(series_length.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            training_runs_total,
            epochs_trained_total,
            training_loss,
            predictions_total,
            model_builds_total,
            evaluation_rmse,
            series_length,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_training_runs(&self, outcome: &str) {
        self.training_runs_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_predictions(&self, degraded: bool) {
        let quality = if degraded { "degraded" } else { "ok" };
        self.predictions_total.with_label_values(&[quality]).inc();
    }

    pub fn record_epoch(&self, loss: f64) {
        self.epochs_trained_total.inc();
        if loss.is_finite() {
            self.training_loss.set(loss);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default Metrics")
    }
}
