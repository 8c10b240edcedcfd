//! Evaluation runner.
//!
//! # Architecture
//!
//! ```text
//! Task → prompt → Generator → answer → Grader → Attempt ┐
//!   ↑___________________ repeat max_tries ______________│
//!                                                       ↓
//!                                        TaskResult (pass@1, pass@k,
//!                                        pass rate, time-to-fix)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grade_forge::grader::{PatchContext, PatchGraderConfig};
//! use grade_forge::llm::MockGenerator;
//! use grade_forge::runner::{evaluate_task, EvalOptions};
//!
//! let config = PatchGraderConfig::default();
//! let options = EvalOptions {
//!     max_tries: 5,
//!     continue_on_error: true,
//!     patch: PatchContext { config: &config, project_root: None },
//! };
//! let result = evaluate_task(&task, &MockGenerator::default(), "gpt-5.2", &options, None).await?;
//! println!("pass@k: {}", result.pass_at_k);
//! ```

pub mod config;
pub mod driver;
pub mod executor;
pub mod result;
pub mod router;

pub use config::EvalConfig;
pub use driver::{run_evaluation, RunOutcome};
pub use executor::{evaluate_task, EvalOptions};
pub use result::{Attempt, FixTime, TaskResult};
pub use router::{choose_route, Route, RouteSamples};
