// Market data domain
pub mod series;
