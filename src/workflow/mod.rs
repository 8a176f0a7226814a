pub mod batch_grader;
pub mod calibration;
pub mod grading_ctx;
pub mod prompts;

pub use batch_grader::{BatchGrader, BatchSettings, BatchStats};
pub use calibration::{CalibrationEngine, CalibrationOutcome, CalibrationSettings};
pub use grading_ctx::GradingContext;
