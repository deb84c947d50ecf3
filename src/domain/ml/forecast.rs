use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Denormalized prediction projected onto prices and trading dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub returns: Vec<f64>,
    pub prices: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub is_degraded: bool,
}

impl Forecast {
    /// Compound `returns` from `last_price`, dating each step on the next weekday.
    pub fn reconstruct(
        returns: Vec<f64>,
        last_price: f64,
        last_date: NaiveDate,
        is_degraded: bool,
    ) -> Self {
        let prices = returns
            .iter()
            .scan(last_price, |price, r| {
                *price *= 1.0 + r;
                Some(*price)
            })
            .collect();

        let dates = std::iter::successors(Some(last_date), |&d| Some(next_weekday(d)))
            .skip(1)
            .take(returns.len())
            .collect();

        Self {
            returns,
            prices,
            dates,
            is_degraded,
        }
    }
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date + Days::new(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next + Days::new(1);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prices_compound_from_last_close() {
        let friday = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let forecast = Forecast::reconstruct(vec![0.1, -0.5, 0.0], 100.0, friday, false);

        assert!((forecast.prices[0] - 110.0).abs() < 1e-9);
        assert!((forecast.prices[1] - 55.0).abs() < 1e-9);
        assert!((forecast.prices[2] - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_dates_skip_weekends() {
        let friday = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let forecast = Forecast::reconstruct(vec![0.0; 3], 1.0, friday, true);

        assert_eq!(
            forecast.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
                NaiveDate::from_ymd_opt(2024, 5, 7).unwrap(),
                NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(),
            ]
        );
        assert!(forecast.is_degraded);
    }
}
