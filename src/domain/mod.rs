// Price series and returns
pub mod market;

// Normalization, windowing and model value types
pub mod ml;

// Descriptive analytics
pub mod performance;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
