pub mod controller;
pub mod estimator;
pub mod timer;

pub use controller::{ControllerConfig, FreqController};
pub use estimator::{EstimatorConfig, EstimatorState, FreqEstimator, Observation, Status};
pub use timer::SyncTimer;
