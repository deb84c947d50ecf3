//! Descriptive analytics snapshot computed from the price history.

use super::stats::Stats;
use crate::domain::errors::ForecastError;
use crate::domain::market::series::SeriesStore;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SHORT_SMA_PERIOD: usize = 50;
pub const LONG_SMA_PERIOD: usize = 200;
pub const ROLLING_VOL_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    /// Compare the latest short and long averages; missing history is neutral.
    pub fn classify(sma_short: Option<f64>, sma_long: Option<f64>) -> Self {
        match (sma_short, sma_long) {
            (Some(short), Some(long)) if short > long => Trend::Bullish,
            (Some(short), Some(long)) if short < long => Trend::Bearish,
            _ => Trend::Neutral,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub total_return: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnStats {
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub positive_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStats {
    pub current_trend: Trend,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolatilityStats {
    pub current_rolling_vol: f64,
    pub avg_rolling_vol: f64,
}

/// Read-only snapshot, always recomputed in full from a `SeriesStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub basic: BasicStats,
    pub returns: ReturnStats,
    pub trends: TrendStats,
    pub volatility: VolatilityStats,
    pub rolling_volatilities: Vec<f64>,
    /// Starts at price index `SHORT_SMA_PERIOD - 1`.
    pub sma50: Vec<f64>,
    /// Starts at price index `LONG_SMA_PERIOD - 1`.
    pub sma200: Vec<f64>,
}

impl Insights {
    pub fn compute(store: &SeriesStore) -> Result<Self, ForecastError> {
        let prices = store.prices();
        let returns: Vec<f64> = store.returns().collect();

        let total_return = match (prices.first(), prices.last()) {
            (Some(first), Some(last)) => last / first - 1.0,
            _ => 0.0,
        };

        let positive_days = if returns.is_empty() {
            0.0
        } else {
            returns.iter().filter(|&&r| r > 0.0).count() as f64 / returns.len() as f64
        };

        let sma50 = Stats::sma(&prices, SHORT_SMA_PERIOD)?;
        let sma200 = Stats::sma(&prices, LONG_SMA_PERIOD)?;
        let rolling_volatilities = Stats::rolling_std_dev(&returns, ROLLING_VOL_WINDOW);

        let latest_sma50 = sma50.last().copied();
        let latest_sma200 = sma200.last().copied();

        Ok(Self {
            basic: BasicStats {
                total_return,
                max_drawdown: Stats::max_drawdown(&prices),
            },
            returns: ReturnStats {
                annualized_volatility: Stats::annualized_volatility(&returns),
                sharpe_ratio: Stats::sharpe_ratio(&returns),
                positive_days,
            },
            trends: TrendStats {
                current_trend: Trend::classify(latest_sma50, latest_sma200),
                sma50: latest_sma50,
                sma200: latest_sma200,
            },
            volatility: VolatilityStats {
                current_rolling_vol: rolling_volatilities.last().copied().unwrap_or(0.0),
                avg_rolling_vol: Stats::mean(&rolling_volatilities),
            },
            rolling_volatilities,
            sma50,
            sma200,
        })
    }
}
