//! Per-attempt and per-task evaluation results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grader::GradeDetails;
use crate::task::TaskFamily;

/// One generation + grading attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based sequence number.
    pub attempt: u32,
    pub passed: bool,
    pub details: GradeDetails,
    /// Wall time of this attempt in seconds.
    pub elapsed_secs: f64,
    /// Seconds from task start until this attempt finished.
    pub finished_at_secs: f64,
    /// Answer length in characters.
    pub output_chars: usize,
    /// `<Kind>: <message>` when generation failed and was tolerated.
    #[serde(default)]
    pub generation_error: Option<String>,
}

/// Time from the first failure to the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "FixTimeRecord", try_from = "FixTimeRecord")]
pub enum FixTime {
    /// Attempt 1 passed; reported as zero seconds.
    FirstTry,
    /// A failure preceded the first pass by this many seconds.
    After(f64),
    /// No pass, or no failure before it.
    NotObserved,
}

impl FixTime {
    /// Seconds to report, `None` when not observed.
    pub fn seconds(&self) -> Option<f64> {
        match self {
            FixTime::FirstTry => Some(0.0),
            FixTime::After(secs) => Some(*secs),
            FixTime::NotObserved => None,
        }
    }

    /// Seconds of a fix that was actually measured. First-try passes are excluded.
    pub fn measured(&self) -> Option<f64> {
        match self {
            FixTime::After(secs) => Some(*secs),
            FixTime::FirstTry | FixTime::NotObserved => None,
        }
    }
}

impl fmt::Display for FixTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seconds() {
            Some(secs) => write!(f, "{:.3}", secs),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixStatus {
    FirstTry,
    After,
    NotObserved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FixTimeRecord {
    status: FixStatus,
    seconds: Option<f64>,
}

impl From<FixTime> for FixTimeRecord {
    fn from(value: FixTime) -> Self {
        let status = match value {
            FixTime::FirstTry => FixStatus::FirstTry,
            FixTime::After(_) => FixStatus::After,
            FixTime::NotObserved => FixStatus::NotObserved,
        };
        Self {
            status,
            seconds: value.seconds(),
        }
    }
}

impl TryFrom<FixTimeRecord> for FixTime {
    type Error = String;

    fn try_from(record: FixTimeRecord) -> Result<Self, Self::Error> {
        match (record.status, record.seconds) {
            (FixStatus::FirstTry, _) => Ok(FixTime::FirstTry),
            (FixStatus::After, Some(secs)) => Ok(FixTime::After(secs)),
            (FixStatus::After, None) => Err("time_to_fix 'after' requires seconds".to_string()),
            (FixStatus::NotObserved, _) => Ok(FixTime::NotObserved),
        }
    }
}

/// Aggregated result of all attempts on one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub family: TaskFamily,
    pub model: String,
    pub attempts: Vec<Attempt>,
    pub pass_at_1: bool,
    pub pass_at_k: bool,
    /// Passes divided by attempts requested.
    pub pass_rate: f64,
    /// Attempts requested.
    pub attempts_total: u32,
    pub time_to_fix: FixTime,
    /// Wall time of the whole task in seconds.
    pub elapsed_secs: f64,
}

impl TaskResult {
    /// Aggregates attempts recorded in order.
    pub fn from_attempts(
        task_id: impl Into<String>,
        family: TaskFamily,
        model: impl Into<String>,
        max_tries: u32,
        attempts: Vec<Attempt>,
        elapsed_secs: f64,
    ) -> Self {
        let pass_at_1 = attempts.first().is_some_and(|a| a.passed);
        let passes = attempts.iter().filter(|a| a.passed).count();
        let pass_rate = if max_tries == 0 {
            0.0
        } else {
            passes as f64 / f64::from(max_tries)
        };

        let first_pass = attempts.iter().find(|a| a.passed).map(|a| a.finished_at_secs);
        let first_failure = attempts.iter().find(|a| !a.passed).map(|a| a.finished_at_secs);
        let time_to_fix = if pass_at_1 {
            FixTime::FirstTry
        } else {
            match (first_failure, first_pass) {
                (Some(failed), Some(fixed)) => FixTime::After(fixed - failed),
                _ => FixTime::NotObserved,
            }
        };

        Self {
            task_id: task_id.into(),
            family,
            model: model.into(),
            pass_at_k: passes > 0,
            attempts,
            pass_at_1,
            pass_rate,
            attempts_total: max_tries,
            time_to_fix,
            elapsed_secs,
        }
    }

    /// Generation error of the first attempt, if any.
    pub fn first_generation_error(&self) -> Option<&str> {
        self.attempts
            .first()
            .and_then(|a| a.generation_error.as_deref())
    }

    /// Coverage reported by the last attempt (code tasks only).
    pub fn last_coverage(&self) -> Option<f64> {
        self.attempts
            .last()
            .and_then(|a| a.details.coverage_percent())
    }
}
