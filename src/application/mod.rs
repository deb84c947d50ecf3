// Model lifecycle and training control
pub mod ml;

// Per-instrument forecasting context
pub mod session;
