//! grade-forge: grading engine for model-generated benchmark answers.
//!
//! Free-text answers are graded against rubrics embedded in the task files,
//! optionally confirmed by an external judge. Code answers are unified diffs
//! applied in a throwaway sandbox and graded by tests, coverage and lint.
//! Attempts are aggregated into pass@1, pass@k, pass rate and time-to-fix.

pub mod cli;
pub mod error;
pub mod grader;
pub mod llm;
pub mod report;
pub mod rubric;
pub mod runner;
pub mod task;

// Re-export commonly used error types
pub use error::{ConfigError, EvalError, GenerationError, ReportError, TaskError};
