//! Sliding windows over the normalized returns series.
//!
//! Window `i` takes inputs `[i, i + window_size)` and labels
//! `[i + window_size, i + window_size + horizon)`. Splits are chronological:
//! financial data is ordered in time, so shuffling would leak the future into
//! the training set.

use crate::domain::errors::ForecastError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub input: Vec<f64>,
    pub label: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub train: Vec<Window>,
    pub test: Vec<Window>,
}

impl Dataset {
    pub fn train_inputs(&self) -> Vec<Vec<f64>> {
        self.train.iter().map(|w| w.input.clone()).collect()
    }

    pub fn train_labels(&self) -> Vec<Vec<f64>> {
        self.train.iter().map(|w| w.label.clone()).collect()
    }

    pub fn test_inputs(&self) -> Vec<Vec<f64>> {
        self.test.iter().map(|w| w.input.clone()).collect()
    }

    pub fn test_labels(&self) -> Vec<Vec<f64>> {
        self.test.iter().map(|w| w.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct WindowBuilder;

impl WindowBuilder {
    /// Every window with `index + window_size + horizon <= series.len()`.
    pub fn build_windows(
        series: &[f64],
        window_size: usize,
        horizon: usize,
    ) -> Result<Vec<Window>, ForecastError> {
        let span = window_size + horizon;
        if window_size == 0 || horizon == 0 || series.len() < span {
            return Err(ForecastError::InsufficientData {
                required: span.max(1),
                actual: series.len(),
            });
        }

        let windows = (0..=series.len() - span)
            .map(|i| Window {
                input: series[i..i + window_size].to_vec(),
                label: series[i + window_size..i + span].to_vec(),
            })
            .collect();

        Ok(windows)
    }

    /// First `floor(n * ratio)` windows train, the rest test. Order is preserved.
    pub fn split(windows: Vec<Window>, ratio: f64) -> Result<Dataset, ForecastError> {
        let n = windows.len();
        let train_len = if ratio.is_finite() && ratio > 0.0 {
            ((n as f64 * ratio).floor() as usize).min(n)
        } else {
            0
        };

        if train_len == 0 || train_len == n {
            return Err(ForecastError::EmptySplit {
                train: train_len,
                test: n - train_len,
                ratio,
            });
        }

        let mut train = windows;
        let test = train.split_off(train_len);
        Ok(Dataset { train, test })
    }

    /// The trailing `window_size` values, used as the live prediction input.
    pub fn last_window(series: &[f64], window_size: usize) -> Result<Vec<f64>, ForecastError> {
        if window_size == 0 || series.len() < window_size {
            return Err(ForecastError::InsufficientData {
                required: window_size.max(1),
                actual: series.len(),
            });
        }
        Ok(series[series.len() - window_size..].to_vec())
    }
}
