pub mod analyzer;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod performance;

#[cfg(test)]
mod engine_tests;

pub use analyzer::resolve_entry_point_name;
pub use engine::validate_syntax;
pub use error::{GradeError, GradeResult, TransformStage};
pub use executor::{run_test_cases, Grader, Submission};
pub use performance::analyze_performance;
