use crate::domain::ml::model::ModelTopology;
use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;

/// Opaque copy of a backend's complete training state. Only the backend that
/// produced it knows how to restore it.
pub type BackendSnapshot = Box<dyn Any + Send>;

/// Numeric backend executing the recurrent network.
///
/// Inputs are windows of `window_size` single-channel steps, labels and outputs
/// are `horizon` values per window. Implementations own their buffers; the
/// model handle calls `release` exactly once before dropping them.
#[async_trait]
pub trait SequenceBackend: Send {
    /// Run one epoch of mini-batch training and return its mean loss.
    async fn fit_epoch(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
        batch_size: usize,
    ) -> Result<f64>;

    fn predict(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>>;

    /// Mean squared error over the given samples.
    fn loss(&self, inputs: &[Vec<f64>], labels: &[Vec<f64>]) -> Result<f64>;

    /// Flattened trainable parameters.
    fn parameters(&self) -> Vec<f64>;

    /// Overwrite the trainable parameters and start optimization afresh.
    fn load_parameters(&mut self, parameters: &[f64]) -> Result<()>;

    /// Everything a later `fit_epoch` depends on: weights, optimizer state
    /// and sampling state.
    fn snapshot(&self) -> BackendSnapshot;

    /// Return to the exact state captured by `snapshot`.
    fn restore(&mut self, snapshot: BackendSnapshot) -> Result<()>;

    fn release(&mut self);
}

/// Allocates backends for a topology.
pub trait BackendFactory: Send + Sync {
    fn create(&self, topology: &ModelTopology) -> Result<Box<dyn SequenceBackend>>;

    fn name(&self) -> &str;
}

/// Observer notified by the regressor after every completed epoch.
#[async_trait]
pub trait EpochHook: Send {
    async fn on_epoch_end(&mut self, epoch: usize, total_epochs: usize, loss: f64);
}

/// No-op hook for callers that do not observe progress.
pub struct NoopHook;

#[async_trait]
impl EpochHook for NoopHook {
    async fn on_epoch_end(&mut self, _epoch: usize, _total_epochs: usize, _loss: f64) {}
}
