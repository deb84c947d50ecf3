pub mod sequence_regressor;
pub mod training_orchestrator;
