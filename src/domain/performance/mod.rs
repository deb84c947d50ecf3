// Series analytics
pub mod insights;
pub mod stats;
