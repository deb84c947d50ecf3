pub mod csv_source;
pub mod ml;
pub mod mock;
pub mod observability;
