use thiserror::Error;

/// Errors raised by the forecasting pipeline.
///
/// Every variant except `Backend` is a precondition violation: it is reported
/// immediately and never retried internally.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Empty series: need at least {required} observations, got {actual}")]
    EmptySeries { required: usize, actual: usize },

    #[error("No data loaded")]
    NoData,

    #[error("Invalid observation at index {index}: {reason}")]
    InvalidObservation { index: usize, reason: String },

    #[error("Degenerate series: all {len} values equal {value}, cannot normalize")]
    DegenerateSeries { len: usize, value: f64 },

    #[error("Normalizer has not been fitted")]
    NotFitted,

    #[error("Insufficient data: need {required} values, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Empty split: {train} train / {test} test windows (ratio {ratio})")]
    EmptySplit {
        train: usize,
        test: usize,
        ratio: f64,
    },

    #[error("Missing data: {what}")]
    MissingData { what: String },

    #[error("Model has not been built")]
    ModelNotBuilt,

    #[error("Model has been disposed, rebuild it before use")]
    ModelDisposed,

    #[error("A training run is already in progress")]
    TrainingInProgress,

    #[error("Indicator error: {0}")]
    Indicator(String),

    #[error("Backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl ForecastError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData { what: what.into() }
    }
}
