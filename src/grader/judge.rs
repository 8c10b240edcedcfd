//! External judge for free-text answers.
//!
//! The judge is any [`Generator`]; only its reply text matters. Replies are
//! parsed fail-closed: anything that is not an unambiguous PASS fails.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{GenerationRequest, Generator};
use crate::task::TaskFamily;

/// Model and family tag sent with every judge request.
pub const JUDGE_TAG: &str = "arbiter";

/// Parsed judge reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeVerdict {
    Pass,
    Fail,
    Ambiguous,
}

impl JudgeVerdict {
    /// Only `Pass` counts as passing.
    pub fn is_pass(&self) -> bool {
        matches!(self, JudgeVerdict::Pass)
    }
}

impl fmt::Display for JudgeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeVerdict::Pass => write!(f, "PASS"),
            JudgeVerdict::Fail => write!(f, "FAIL"),
            JudgeVerdict::Ambiguous => write!(f, "AMBIGUOUS"),
        }
    }
}

/// Parses a judge reply.
///
/// PASS requires "PASS" without "FAIL"; FAIL requires "FAIL" without "PASS".
/// Everything else, including an empty reply, is ambiguous.
pub fn parse_verdict(reply: &str) -> JudgeVerdict {
    let reply = reply.trim().to_uppercase();
    match (reply.contains("PASS"), reply.contains("FAIL")) {
        (true, false) => JudgeVerdict::Pass,
        (false, true) => JudgeVerdict::Fail,
        _ => JudgeVerdict::Ambiguous,
    }
}

/// Builds the judge prompt.
pub fn judge_prompt(task_text: &str, answer: &str) -> String {
    format!(
        "You are a strict grader. Output only PASS or FAIL.\n\n\
         Task:\n{}\n\n\
         Answer:\n{}\n",
        task_text, answer
    )
}

/// Handle to the configured judge.
#[derive(Clone)]
pub struct JudgeClient {
    generator: Arc<dyn Generator>,
}

impl JudgeClient {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Asks the judge about one answer.
    ///
    /// A transport failure is logged and reported as `Fail`.
    pub async fn verdict(&self, family: TaskFamily, task_text: &str, answer: &str) -> JudgeVerdict {
        let request = GenerationRequest::new(
            judge_prompt(task_text, answer),
            JUDGE_TAG,
            JUDGE_TAG,
            family.as_str(),
        );

        match self.generator.generate(&request).await {
            Ok(reply) => {
                let verdict = parse_verdict(&reply);
                debug!(family = %family, verdict = %verdict, "Judge replied");
                verdict
            }
            Err(e) => {
                warn!(family = %family, error = %e, "Judge call failed, treating as FAIL");
                JudgeVerdict::Fail
            }
        }
    }
}

impl fmt::Debug for JudgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JudgeClient").finish_non_exhaustive()
    }
}
