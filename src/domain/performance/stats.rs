use crate::domain::errors::ForecastError;
use statrs::statistics::{Data, Distribution};
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Shared statistics utilities for financial calculations.
pub struct Stats;

impl Stats {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        Data::new(values.to_vec()).mean().unwrap_or(0.0)
    }

    /// Sample standard deviation (n-1). Fewer than two values yield 0.
    pub fn std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        Data::new(values.to_vec())
            .std_dev()
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
    }

    /// Annualized Sharpe ratio of daily returns (risk-free rate 0).
    ///
    /// Zero variance reports 0 rather than dividing by zero.
    pub fn sharpe_ratio(returns: &[f64]) -> f64 {
        let std_dev = Self::std_dev(returns);
        if std_dev <= 1e-12 {
            return 0.0;
        }
        Self::mean(returns) / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    }

    pub fn annualized_volatility(returns: &[f64]) -> f64 {
        Self::std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
    }

    /// Most negative `(price - peak) / peak` over the series; never positive.
    pub fn max_drawdown(prices: &[f64]) -> f64 {
        let mut max_dd = 0.0_f64;
        let mut peak = f64::NEG_INFINITY;

        for &price in prices {
            if price > peak {
                peak = price;
            }
            if peak > 0.0 {
                max_dd = max_dd.min((price - peak) / peak);
            }
        }

        max_dd
    }

    /// Trailing simple moving average. The first `period - 1` points have no
    /// value and are omitted, so the output is `period - 1` shorter than input.
    pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>, ForecastError> {
        let mut sma = SimpleMovingAverage::new(period)
            .map_err(|e| ForecastError::Indicator(format!("SMA({}): {:?}", period, e)))?;
        Ok(values
            .iter()
            .map(|&v| sma.next(v))
            .skip(period - 1)
            .collect())
    }

    /// Standard deviation over each trailing window of `period` values.
    pub fn rolling_std_dev(values: &[f64], period: usize) -> Vec<f64> {
        if period == 0 || values.len() < period {
            return Vec::new();
        }
        values.windows(period).map(Self::std_dev).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharpe_ratio() {
        let returns = vec![0.01, 0.02, 0.01, 0.02];
        assert!(Stats::sharpe_ratio(&returns) > 0.0);

        let returns_zero = vec![0.01, 0.01, 0.01];
        assert_eq!(Stats::sharpe_ratio(&returns_zero), 0.0);
    }

    #[test]
    fn test_sharpe_matches_formula() {
        let returns = vec![0.01, -0.02, 0.03, 0.005];
        let mean = returns.iter().sum::<f64>() / 4.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;
        let expected = mean / var.sqrt() * 252f64.sqrt();
        assert!((Stats::sharpe_ratio(&returns) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_std_dev_of_single_value_is_zero() {
        assert_eq!(Stats::std_dev(&[0.5]), 0.0);
        assert_eq!(Stats::std_dev(&[]), 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        assert_eq!(Stats::max_drawdown(&[1.0, 2.0, 2.0, 3.0]), 0.0);

        let dd = Stats::max_drawdown(&[100.0, 120.0, 90.0, 110.0, 60.0, 130.0]);
        assert!((dd - (60.0 - 120.0) / 120.0).abs() < 1e-12);
    }

    #[test]
    fn test_sma_lengths_and_values() {
        let prices: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let sma3 = Stats::sma(&prices, 3).unwrap();
        assert_eq!(sma3.len(), 8);
        assert!((sma3[0] - 2.0).abs() < 1e-12);
        assert!((sma3[7] - 9.0).abs() < 1e-12);

        assert!(Stats::sma(&prices, 11).unwrap().is_empty());
        assert_eq!(Stats::sma(&prices, 10).unwrap(), vec![5.5]);
    }

    #[test]
    fn test_sma_rejects_zero_period() {
        assert!(matches!(
            Stats::sma(&[1.0, 2.0], 0),
            Err(ForecastError::Indicator(_))
        ));
    }

    #[test]
    fn test_rolling_std_dev_length() {
        let values: Vec<f64> = (0..25).map(|x| (x as f64).sin()).collect();
        assert_eq!(Stats::rolling_std_dev(&values, 20).len(), 6);
        assert!(Stats::rolling_std_dev(&values[..10], 20).is_empty());
    }
}
