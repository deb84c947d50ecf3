//! Explicit context object owning the whole forecasting pipeline for one
//! instrument: series, normalizer, dataset, model and training orchestrator.

use crate::application::ml::sequence_regressor::SequenceRegressor;
use crate::application::ml::training_orchestrator::{
    TrainingEvent, TrainingOrchestrator, TrainingSummary,
};
use crate::config::Config;
use crate::domain::errors::ForecastError;
use crate::domain::market::series::{Observation, SeriesStore};
use crate::domain::ml::forecast::Forecast;
use crate::domain::ml::model::{EvaluationMetrics, ModelState, ModelTopology};
use crate::domain::ml::normalization::Normalizer;
use crate::domain::ml::windowing::{Dataset, WindowBuilder};
use crate::domain::performance::insights::Insights;
use crate::domain::ports::BackendFactory;
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Everything derived from the series by `prepare_dataset`.
struct Prepared {
    normalizer: Normalizer,
    normalized_returns: Vec<f64>,
    dataset: Dataset,
    topology: ModelTopology,
}

pub struct ForecastSession {
    config: Config,
    store: SeriesStore,
    insights: Option<Insights>,
    prepared: Option<Prepared>,
    regressor: SequenceRegressor,
    orchestrator: TrainingOrchestrator,
    metrics: Metrics,
    /// The trained weights were fitted on the currently loaded series.
    trained_on_series: bool,
}

impl ForecastSession {
    pub fn new(config: Config, factory: Arc<dyn BackendFactory>, metrics: Metrics) -> Self {
        let regressor = SequenceRegressor::new(factory, config.batch_size);
        let orchestrator =
            TrainingOrchestrator::new(config.orchestrator_settings(), metrics.clone());
        Self {
            config,
            store: SeriesStore::new(),
            insights: None,
            prepared: None,
            regressor,
            orchestrator,
            metrics,
            trained_on_series: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the series and recompute insights.
    ///
    /// Any prepared dataset belongs to the previous series and is dropped.
    pub fn load_series(
        &mut self,
        observations: Vec<Observation>,
    ) -> Result<&Insights, ForecastError> {
        let mut store = SeriesStore::new();
        store.load(observations)?;
        let insights = Insights::compute(&store)?;

        info!(
            "ForecastSession: loaded {} observations (total return {:.2}%, trend {})",
            store.len(),
            insights.basic.total_return * 100.0,
            insights.trends.current_trend
        );
        self.metrics.series_length.set(store.len() as f64);

        self.store = store;
        self.prepared = None;
        self.trained_on_series = false;
        Ok(self.insights.insert(insights))
    }

    pub fn insights(&self) -> Option<&Insights> {
        self.insights.as_ref()
    }

    pub fn series(&self) -> &SeriesStore {
        &self.store
    }

    /// Normalize returns, window them and split chronologically.
    ///
    /// The model is built when missing or when the window/horizon shape
    /// changes, and reused otherwise. A disposed model stays disposed until
    /// `rebuild_model`.
    pub fn prepare_dataset(
        &mut self,
        window_size: usize,
        horizon: usize,
        split_ratio: f64,
    ) -> Result<&Dataset, ForecastError> {
        if self.store.is_empty() {
            return Err(ForecastError::NoData);
        }

        let returns: Vec<f64> = self.store.returns().collect();
        let mut normalizer = Normalizer::new();
        let params = normalizer.fit(&returns)?;
        let normalized_returns = normalizer.normalize_all(&returns)?;
        let windows = WindowBuilder::build_windows(&normalized_returns, window_size, horizon)?;
        let dataset = WindowBuilder::split(windows, split_ratio)?;

        let topology = ModelTopology {
            window_size,
            horizon,
            ..self.config.topology()
        };
        let state = self.regressor.state();
        let keep_model = state == ModelState::Disposed
            || self
                .regressor
                .topology()
                .is_some_and(|current| current.same_shape(&topology));
        if !keep_model {
            self.regressor.build(topology)?;
            self.metrics.model_builds_total.inc();
        } else if self.is_model_stale() {
            warn!(
                "ForecastSession: reusing a model trained on a previous series; retrain before trusting its evaluation"
            );
        }

        info!(
            "ForecastSession: prepared {} train / {} test windows (window={}, horizon={}, returns in [{:.5}, {:.5}], model {})",
            dataset.train.len(),
            dataset.test.len(),
            window_size,
            horizon,
            params.min(),
            params.max(),
            if keep_model { state.to_string() } else { "rebuilt".to_string() }
        );

        let prepared = self.prepared.insert(Prepared {
            normalizer,
            normalized_returns,
            dataset,
            topology,
        });
        Ok(&prepared.dataset)
    }

    /// Prepare with the configured window, horizon and split ratio.
    pub fn prepare_default_dataset(&mut self) -> Result<&Dataset, ForecastError> {
        let (window, horizon, ratio) = (
            self.config.window_size,
            self.config.prediction_horizon,
            self.config.split_ratio,
        );
        self.prepare_dataset(window, horizon, ratio)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.prepared.as_ref().map(|p| &p.dataset)
    }

    pub fn model_state(&self) -> ModelState {
        self.regressor.state()
    }

    pub fn is_training(&self) -> bool {
        self.orchestrator.is_training()
    }

    /// The model is trained, but not on the series currently loaded.
    pub fn is_model_stale(&self) -> bool {
        self.regressor.state() == ModelState::Trained && !self.trained_on_series
    }

    /// Train on the prepared dataset, reporting on `events`.
    pub async fn train(
        &mut self,
        epochs: usize,
        events: &UnboundedSender<TrainingEvent>,
    ) -> Result<TrainingSummary, ForecastError> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| ForecastError::missing("prepared dataset"))?;
        if self.regressor.state() == ModelState::Unbuilt {
            self.regressor.build(prepared.topology)?;
            self.metrics.model_builds_total.inc();
        }

        let summary = self
            .orchestrator
            .run(&mut self.regressor, &prepared.dataset, epochs, events)
            .await?;
        self.trained_on_series = true;
        Ok(summary)
    }

    /// Forecast the next `horizon` returns from the latest window.
    ///
    /// A degraded model answer is reported as flat (zero) returns.
    pub fn predict(&self) -> Result<Forecast, ForecastError> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| ForecastError::missing("prepared dataset"))?;
        let window = WindowBuilder::last_window(
            &prepared.normalized_returns,
            prepared.topology.window_size,
        )?;

        let prediction = self.regressor.predict(&window)?;
        self.metrics.inc_predictions(prediction.is_degraded);

        let returns = if prediction.is_degraded {
            warn!("ForecastSession: serving degraded forecast");
            prediction.values
        } else {
            prepared.normalizer.denormalize_all(&prediction.values)?
        };

        Ok(Forecast::reconstruct(
            returns,
            self.store.latest_price()?,
            self.store.last_date()?,
            prediction.is_degraded,
        ))
    }

    /// Metrics on the held-out test windows (placeholder before training).
    pub fn evaluate(&self) -> Result<EvaluationMetrics, ForecastError> {
        match &self.prepared {
            Some(prepared) => self.regressor.evaluate(
                &prepared.dataset.test_inputs(),
                &prepared.dataset.test_labels(),
            ),
            None => self.regressor.evaluate(&[], &[]),
        }
    }

    /// Discard the current model and build a fresh one for the prepared shape.
    pub fn rebuild_model(&mut self) -> Result<(), ForecastError> {
        let topology = self
            .prepared
            .as_ref()
            .map(|p| p.topology)
            .ok_or_else(|| ForecastError::missing("prepared dataset"))?;
        self.regressor.build(topology)?;
        self.metrics.model_builds_total.inc();
        self.trained_on_series = false;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.regressor.dispose();
    }
}
