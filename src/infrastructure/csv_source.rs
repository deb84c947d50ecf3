//! Daily price series loaded from CSV files with `date` and `price`/`close` columns.

use crate::domain::market::series::Observation;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct PriceRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "close", alias = "Close", alias = "Price")]
    price: f64,
}

/// Read observations in file order. Extra columns are ignored.
pub fn read_observations<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    rdr.deserialize()
        .enumerate()
        .map(|(row, result)| {
            let record: PriceRecord =
                result.with_context(|| format!("Invalid price record at row {}", row + 1))?;
            Ok(Observation::new(record.date, record.price))
        })
        .collect()
}

pub fn load_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let observations = read_observations(BufReader::new(file))
        .with_context(|| format!("Failed to parse {:?}", path))?;
    info!("Loaded {} observations from {:?}", observations.len(), path);
    Ok(observations)
}
