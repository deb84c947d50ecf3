use crate::domain::errors::ForecastError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Minimum number of observations needed to derive a single return.
pub const MIN_OBSERVATIONS: usize = 2;

/// One daily close for the tracked instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub price: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Ordered price history, oldest first.
///
/// Replaced wholesale on every load; returns are always derived from the
/// current observations and never cached.
#[derive(Debug, Clone, Default)]
pub struct SeriesStore {
    observations: Vec<Observation>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored history. On error the previous history is kept.
    pub fn load(&mut self, observations: Vec<Observation>) -> Result<(), ForecastError> {
        Self::validate(&observations)?;
        self.observations = observations;
        Ok(())
    }

    fn validate(observations: &[Observation]) -> Result<(), ForecastError> {
        if observations.len() < MIN_OBSERVATIONS {
            return Err(ForecastError::EmptySeries {
                required: MIN_OBSERVATIONS,
                actual: observations.len(),
            });
        }

        for (index, obs) in observations.iter().enumerate() {
            if !obs.price.is_finite() || obs.price <= 0.0 {
                return Err(ForecastError::InvalidObservation {
                    index,
                    reason: format!("price must be positive and finite, got {}", obs.price),
                });
            }
        }

        if let Some(index) = observations
            .windows(2)
            .position(|pair| pair[1].date < pair[0].date)
        {
            return Err(ForecastError::InvalidObservation {
                index: index + 1,
                reason: format!(
                    "date {} precedes {}",
                    observations[index + 1].date,
                    observations[index].date
                ),
            });
        }

        Ok(())
    }

    /// Simple returns `p[i+1] / p[i] - 1`, one fewer than the observations.
    pub fn returns(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations
            .windows(2)
            .map(|pair| pair[1].price / pair[0].price - 1.0)
    }

    pub fn latest_price(&self) -> Result<f64, ForecastError> {
        self.observations
            .last()
            .map(|obs| obs.price)
            .ok_or(ForecastError::NoData)
    }

    pub fn last_date(&self) -> Result<NaiveDate, ForecastError> {
        self.observations
            .last()
            .map(|obs| obs.date)
            .ok_or(ForecastError::NoData)
    }

    pub fn prices(&self) -> Vec<f64> {
        self.observations.iter().map(|obs| obs.price).collect()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
