//! Lifecycle owner of the recurrent model.
//!
//! States: `Unbuilt -> Built -> Trained`, `build` resets to `Built`, and
//! `dispose` is terminal until the next explicit `build`.

use crate::domain::errors::ForecastError;
use crate::domain::ml::model::{
    EvaluationMetrics, ModelState, ModelTopology, Prediction, clamp_epochs,
};
use crate::domain::ml::windowing::Dataset;
use crate::domain::ports::{BackendFactory, BackendSnapshot, EpochHook, SequenceBackend};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Exclusive owner of one backend instance. Releases it on drop, so every
/// exit path (rebuild, dispose, failure, teardown) frees backend buffers.
pub struct ModelHandle {
    backend: Box<dyn SequenceBackend>,
    topology: ModelTopology,
}

impl ModelHandle {
    pub fn topology(&self) -> &ModelTopology {
        &self.topology
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        self.backend.release();
        debug!(
            "ModelHandle: released backend ({}x{})",
            self.topology.window_size, self.topology.horizon
        );
    }
}

pub struct SequenceRegressor {
    factory: Arc<dyn BackendFactory>,
    handle: Option<ModelHandle>,
    state: ModelState,
    batch_size: usize,
}

impl SequenceRegressor {
    pub fn new(factory: Arc<dyn BackendFactory>, batch_size: usize) -> Self {
        Self {
            factory,
            handle: None,
            state: ModelState::Unbuilt,
            batch_size: batch_size.max(1),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn topology(&self) -> Option<&ModelTopology> {
        self.handle.as_ref().map(ModelHandle::topology)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Batch size actually used for `samples` training windows.
    pub fn effective_batch_size(&self, samples: usize) -> usize {
        self.batch_size.min(samples).max(1)
    }

    /// Release any existing backend, then allocate a fresh one.
    ///
    /// If allocation fails the regressor is left `Unbuilt`.
    pub fn build(&mut self, topology: ModelTopology) -> Result<(), ForecastError> {
        if let Some(previous) = self.handle.take() {
            drop(previous);
            info!("SequenceRegressor: released previous model before rebuild");
        }
        self.state = ModelState::Unbuilt;

        let backend = self
            .factory
            .create(&topology)
            .map_err(ForecastError::Backend)?;
        self.handle = Some(ModelHandle { backend, topology });
        self.state = ModelState::Built;

        info!(
            "SequenceRegressor: built {} model (window={}, horizon={}, hidden={})",
            self.factory.name(),
            topology.window_size,
            topology.horizon,
            topology.hidden_units
        );
        Ok(())
    }

    fn live_handle(&self) -> Result<&ModelHandle, ForecastError> {
        match self.state {
            ModelState::Disposed => Err(ForecastError::ModelDisposed),
            _ => self.handle.as_ref().ok_or(ForecastError::ModelNotBuilt),
        }
    }

    /// Train for `max(1, epochs)` epochs and return the last epoch's loss.
    ///
    /// On a backend failure the backend is restored from the pre-call
    /// snapshot, the state is unchanged and the error is returned.
    pub async fn train(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
        epochs: usize,
        hook: &mut dyn EpochHook,
    ) -> Result<f64, ForecastError> {
        let (loss, _checkpoint) = self.fit(inputs, labels, epochs, hook).await?;
        self.state = ModelState::Trained;
        Ok(loss)
    }

    /// Train on the dataset's train windows, then score its test windows.
    ///
    /// `Trained` is committed only once both succeed; a failed evaluation rolls
    /// the backend back exactly like a failed epoch.
    pub async fn train_on(
        &mut self,
        dataset: &Dataset,
        epochs: usize,
        hook: &mut dyn EpochHook,
    ) -> Result<(f64, EvaluationMetrics), ForecastError> {
        let test_inputs = dataset.test_inputs();
        let test_labels = dataset.test_labels();
        if test_inputs.is_empty() {
            return Err(ForecastError::missing("evaluation windows"));
        }

        let (loss, checkpoint) = self
            .fit(&dataset.train_inputs(), &dataset.train_labels(), epochs, hook)
            .await?;

        match self.measure(&test_inputs, &test_labels) {
            Ok(metrics) => {
                self.state = ModelState::Trained;
                Ok((loss, metrics))
            }
            Err(e) => {
                warn!("SequenceRegressor: evaluation after training failed: {}", e);
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Run the epochs without touching `state`. Returns the last loss and the
    /// pre-call snapshot so the caller can still roll back.
    async fn fit(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
        epochs: usize,
        hook: &mut dyn EpochHook,
    ) -> Result<(f64, BackendSnapshot), ForecastError> {
        self.live_handle()?;
        if inputs.is_empty() {
            return Err(ForecastError::missing("training inputs"));
        }
        if labels.len() != inputs.len() {
            return Err(ForecastError::missing(format!(
                "training labels ({} labels for {} inputs)",
                labels.len(),
                inputs.len()
            )));
        }

        let epochs = clamp_epochs(epochs);
        let batch_size = self.effective_batch_size(inputs.len());
        let handle = self.handle.as_mut().ok_or(ForecastError::ModelNotBuilt)?;
        let checkpoint = handle.backend.snapshot();

        let mut last_loss = f64::NAN;
        for epoch in 1..=epochs {
            let outcome = handle.backend.fit_epoch(inputs, labels, batch_size).await;
            match outcome {
                Ok(loss) => {
                    last_loss = loss;
                    hook.on_epoch_end(epoch, epochs, loss).await;
                }
                Err(e) => {
                    warn!(
                        "SequenceRegressor: training failed at epoch {}/{}: {}",
                        epoch, epochs, e
                    );
                    self.rollback(checkpoint);
                    return Err(ForecastError::Backend(e));
                }
            }
        }

        Ok((last_loss, checkpoint))
    }

    fn rollback(&mut self, checkpoint: BackendSnapshot) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.backend.restore(checkpoint) {
                error!("SequenceRegressor: failed to restore checkpoint: {}", e);
            }
        }
    }

    /// Predict the next `horizon` normalized values from `window`.
    ///
    /// A backend failure yields a zero-filled prediction flagged as degraded.
    pub fn predict(&self, window: &[f64]) -> Result<Prediction, ForecastError> {
        let handle = self.live_handle()?;
        let topology = handle.topology;

        if window.len() < topology.window_size {
            return Err(ForecastError::InsufficientData {
                required: topology.window_size,
                actual: window.len(),
            });
        }
        let window = window[window.len() - topology.window_size..].to_vec();

        match handle.backend.predict(&[window]) {
            Ok(mut outputs) if outputs.len() == 1 && outputs[0].len() == topology.horizon => {
                Ok(Prediction {
                    values: outputs.remove(0),
                    is_degraded: false,
                })
            }
            Ok(outputs) => {
                warn!(
                    "SequenceRegressor: backend returned {} outputs of unexpected shape, degrading",
                    outputs.len()
                );
                Ok(Prediction::degraded(topology.horizon))
            }
            Err(e) => {
                warn!("SequenceRegressor: prediction failed, degrading: {}", e);
                Ok(Prediction::degraded(topology.horizon))
            }
        }
    }

    /// `{loss, mse, rmse}` on held-out windows.
    ///
    /// An untrained model answers with `EvaluationMetrics::PLACEHOLDER`.
    pub fn evaluate(
        &self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
    ) -> Result<EvaluationMetrics, ForecastError> {
        match self.state {
            ModelState::Disposed => return Err(ForecastError::ModelDisposed),
            ModelState::Unbuilt | ModelState::Built => {
                debug!("SequenceRegressor: evaluate before training, returning placeholder");
                return Ok(EvaluationMetrics::PLACEHOLDER);
            }
            ModelState::Trained => {}
        }

        self.measure(inputs, labels)
    }

    /// `{loss, mse, rmse}` from the live backend, whatever the state.
    fn measure(
        &self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
    ) -> Result<EvaluationMetrics, ForecastError> {
        if inputs.is_empty() || labels.len() != inputs.len() {
            return Err(ForecastError::missing("evaluation windows"));
        }
        let handle = self.live_handle()?;

        let loss = handle
            .backend
            .loss(inputs, labels)
            .map_err(ForecastError::Backend)?;
        let predictions = handle
            .backend
            .predict(inputs)
            .map_err(ForecastError::Backend)?;

        let (sum, count) = predictions
            .iter()
            .zip(labels)
            .flat_map(|(pred, label)| pred.iter().zip(label))
            .fold((0.0, 0usize), |(sum, count), (p, y)| {
                (sum + (p - y).powi(2), count + 1)
            });
        let mse = if count == 0 { 0.0 } else { sum / count as f64 };

        Ok(EvaluationMetrics::from_mse(loss, mse))
    }

    /// Release the backend and enter `Disposed`. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle);
            info!("SequenceRegressor: model disposed");
        }
        self.state = ModelState::Disposed;
    }
}
