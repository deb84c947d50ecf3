//! Min/max scaling between the raw return domain and the model's `[0, 1]` domain.

use crate::domain::errors::ForecastError;
use serde::{Deserialize, Serialize};

/// Scaling parameters fixed at fit time. Invariant: `max > min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    min: f64,
    max: f64,
}

impl NormalizationParams {
    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    params: Option<NormalizationParams>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit `{min, max}` over `series`, replacing any previous parameters.
    ///
    /// A failed fit leaves the previous parameters untouched.
    pub fn fit(&mut self, series: &[f64]) -> Result<NormalizationParams, ForecastError> {
        let (min, max) = series
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        if series.is_empty() || !min.is_finite() || !max.is_finite() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: series.iter().filter(|v| v.is_finite()).count(),
            });
        }

        if max == min {
            return Err(ForecastError::DegenerateSeries {
                len: series.len(),
                value: min,
            });
        }

        let params = NormalizationParams { min, max };
        self.params = Some(params);
        Ok(params)
    }

    pub fn params(&self) -> Option<NormalizationParams> {
        self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    /// `(value - min) / (max - min)`; values outside the fit range extrapolate.
    pub fn normalize(&self, value: f64) -> Result<f64, ForecastError> {
        let p = self.params.ok_or(ForecastError::NotFitted)?;
        Ok((value - p.min) / p.range())
    }

    pub fn denormalize(&self, value: f64) -> Result<f64, ForecastError> {
        let p = self.params.ok_or(ForecastError::NotFitted)?;
        Ok(value * p.range() + p.min)
    }

    pub fn normalize_all(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        values.iter().map(|&v| self.normalize(v)).collect()
    }

    pub fn denormalize_all(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        values.iter().map(|&v| self.denormalize(v)).collect()
    }
}
