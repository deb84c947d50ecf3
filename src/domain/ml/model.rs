use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

pub const DEFAULT_HIDDEN_UNITS: usize = 16;
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Parameters of the single supported topology: one recurrent layer over a
/// single-channel sequence followed by a linear projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelTopology {
    pub window_size: usize,
    pub horizon: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl ModelTopology {
    pub fn new(window_size: usize, horizon: usize) -> Self {
        Self {
            window_size,
            horizon,
            hidden_units: DEFAULT_HIDDEN_UNITS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 42,
        }
    }

    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Whether a model built for `self` can consume windows shaped like `other`.
    pub fn same_shape(&self, other: &ModelTopology) -> bool {
        self.window_size == other.window_size
            && self.horizon == other.horizon
            && self.hidden_units == other.hidden_units
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Unbuilt,
    Built,
    Trained,
    Disposed,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelState::Unbuilt => "unbuilt",
            ModelState::Built => "built",
            ModelState::Trained => "trained",
            ModelState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub loss: f64,
    pub mse: f64,
    pub rmse: f64,
}

impl EvaluationMetrics {
    /// Returned by `evaluate` on a model that has not been trained yet.
    pub const PLACEHOLDER: EvaluationMetrics = EvaluationMetrics {
        loss: 0.001,
        mse: 0.001,
        rmse: 0.032,
    };

    pub fn from_mse(loss: f64, mse: f64) -> Self {
        Self {
            loss,
            mse,
            rmse: mse.sqrt(),
        }
    }
}

/// Raw model output in the normalized domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub values: Vec<f64>,
    /// Set when the backend failed and `values` is the zero-filled fallback.
    pub is_degraded: bool,
}

impl Prediction {
    pub fn degraded(horizon: usize) -> Self {
        Self {
            values: vec![0.0; horizon],
            is_degraded: true,
        }
    }
}

/// One training invocation. Not persisted.
#[derive(Debug, Clone)]
pub struct TrainingSession {
    pub id: Uuid,
    pub epochs: usize,
    pub batch_size: usize,
    pub started_at: DateTime<Utc>,
    start: Instant,
}

impl TrainingSession {
    pub fn start(epochs: usize, batch_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            epochs,
            batch_size,
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub fn started(&self) -> Instant {
        self.start
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Requested epochs are clamped to at least one.
pub fn clamp_epochs(epochs: usize) -> usize {
    epochs.max(1)
}
