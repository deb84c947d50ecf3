pub mod forecast;
pub mod model;
pub mod normalization;
pub mod windowing;
