use crate::domain::ml::model::ModelTopology;
use crate::domain::ports::{BackendFactory, BackendSnapshot, SequenceBackend};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Shared counters observed by tests across backend instances.
#[derive(Debug, Default)]
pub struct MockBackendStats {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub epochs: AtomicUsize,
    pub last_batch_size: AtomicUsize,
}

impl MockBackendStats {
    /// Backends created but not yet released.
    pub fn live(&self) -> usize {
        self.created.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }
}

/// Scripted failure modes for `MockBackend`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBehavior {
    /// Fail when this 1-based epoch (counted per backend) runs.
    pub fail_on_epoch: Option<usize>,
    pub fail_predict: bool,
    /// Fail every `loss` call, which makes evaluation fail.
    pub fail_loss: bool,
    pub fail_create: bool,
}

/// Deterministic backend whose single parameter is the value it predicts.
///
/// Each epoch moves the parameter halfway to the mean label and reports the
/// resulting mean squared error.
pub struct MockBackend {
    horizon: usize,
    window_size: usize,
    level: f64,
    epochs_run: usize,
    behavior: MockBehavior,
    stats: Arc<MockBackendStats>,
    released: bool,
}

impl MockBackend {
    fn mse(&self, labels: &[Vec<f64>]) -> f64 {
        let count = labels.iter().map(|l| l.len()).sum::<usize>().max(1);
        labels
            .iter()
            .flatten()
            .map(|y| (y - self.level).powi(2))
            .sum::<f64>()
            / count as f64
    }
}

#[async_trait]
impl SequenceBackend for MockBackend {
    async fn fit_epoch(
        &mut self,
        inputs: &[Vec<f64>],
        labels: &[Vec<f64>],
        batch_size: usize,
    ) -> Result<f64> {
        if self.released {
            bail!("mock backend released");
        }
        self.epochs_run += 1;
        self.stats.epochs.fetch_add(1, Ordering::SeqCst);
        self.stats
            .last_batch_size
            .store(batch_size, Ordering::SeqCst);

        if self.behavior.fail_on_epoch == Some(self.epochs_run) {
            // Corrupt state first so callers must restore from their checkpoint.
            self.level = f64::NAN;
            bail!("mock backend failure at epoch {}", self.epochs_run);
        }

        if inputs.len() != labels.len() {
            bail!("{} inputs but {} labels", inputs.len(), labels.len());
        }

        let count = labels.iter().map(|l| l.len()).sum::<usize>().max(1);
        let target = labels.iter().flatten().sum::<f64>() / count as f64;
        self.level += (target - self.level) * 0.5;
        Ok(self.mse(labels))
    }

    fn predict(&self, inputs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if self.released || self.behavior.fail_predict {
            bail!("mock backend predict failure");
        }
        if let Some(bad) = inputs.iter().find(|x| x.len() != self.window_size) {
            bail!("input window has length {}", bad.len());
        }
        Ok(inputs.iter().map(|_| vec![self.level; self.horizon]).collect())
    }

    fn loss(&self, _inputs: &[Vec<f64>], labels: &[Vec<f64>]) -> Result<f64> {
        if self.released || self.behavior.fail_loss {
            bail!("mock backend loss failure");
        }
        Ok(self.mse(labels))
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.level]
    }

    fn load_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        match parameters {
            [level] => {
                self.level = *level;
                Ok(())
            }
            _ => bail!("mock backend expects exactly one parameter"),
        }
    }

    fn snapshot(&self) -> BackendSnapshot {
        Box::new(self.level)
    }

    // `epochs_run` stays outside the snapshot: scripted failures count every call.
    fn restore(&mut self, snapshot: BackendSnapshot) -> Result<()> {
        match snapshot.downcast::<f64>() {
            Ok(level) => {
                self.level = *level;
                Ok(())
            }
            Err(_) => bail!("snapshot was not taken from a mock backend"),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone, Default)]
pub struct MockBackendFactory {
    pub behavior: MockBehavior,
    pub stats: Arc<MockBackendStats>,
}

impl MockBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(MockBackendStats::default()),
        }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create(&self, topology: &ModelTopology) -> Result<Box<dyn SequenceBackend>> {
        if self.behavior.fail_create {
            bail!("mock backend allocation failure");
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        info!(
            "MockBackendFactory: created backend #{} ({}x{})",
            self.stats.created.load(Ordering::SeqCst),
            topology.window_size,
            topology.horizon
        );
        Ok(Box::new(MockBackend {
            horizon: topology.horizon,
            window_size: topology.window_size,
            level: 0.0,
            epochs_run: 0,
            behavior: self.behavior,
            stats: self.stats.clone(),
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
