//! Grading of candidate answers.
//!
//! Free-text families are graded against the task's embedded rubric, family
//! format checks and an optional judge. Code tasks are graded by applying the
//! candidate patch in a disposable workspace and running the project's tools.
//!
//! All grading outcomes are values: unsafe patches, failing tools and judge
//! trouble produce failed grades, never errors.

pub mod code;
pub mod coverage;
pub mod judge;
pub mod patch;
pub mod sandbox;
pub mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rubric::RubricStyle;
use crate::task::{Task, TaskKind};

pub use code::{grade_patch, PatchGrade, PatchGraderConfig, PatchStage};
pub use coverage::parse_coverage;
pub use judge::{parse_verdict, JudgeClient, JudgeVerdict};
pub use patch::{check_patch_safety, edit_lines, extract_patch_paths, PatchSafety};
pub use sandbox::{find_project_root, SandboxWorkspace};
pub use text::TextGrade;

/// Family-specific grade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradeDetails {
    Text(TextGrade),
    Patch(PatchGrade),
}

impl GradeDetails {
    pub fn passed(&self) -> bool {
        match self {
            GradeDetails::Text(grade) => grade.passed,
            GradeDetails::Patch(grade) => grade.passed,
        }
    }

    /// Forces the grade to failed.
    pub fn fail(&mut self) {
        match self {
            GradeDetails::Text(grade) => grade.passed = false,
            GradeDetails::Patch(grade) => grade.passed = false,
        }
    }

    pub fn coverage_percent(&self) -> Option<f64> {
        match self {
            GradeDetails::Patch(grade) => grade.coverage_percent,
            GradeDetails::Text(_) => None,
        }
    }
}

/// Settings the patch grader needs beyond the task itself.
#[derive(Debug, Clone, Copy)]
pub struct PatchContext<'a> {
    pub config: &'a PatchGraderConfig,
    /// Overrides project root discovery when set.
    pub project_root: Option<&'a Path>,
}

/// Grades `answer` for `task`.
///
/// `task_text` is the task source the rubric is read from; it is ignored for
/// code tasks, which read their files from the task directory.
pub async fn grade_answer(
    task: &Task,
    task_text: &str,
    answer: &str,
    judge: Option<&JudgeClient>,
    patch: PatchContext<'_>,
) -> GradeDetails {
    let family = task.family();
    match &task.kind {
        TaskKind::General(rules) => GradeDetails::Text(
            text::grade_text(
                family,
                RubricStyle::HtmlComment,
                text::general_checks(rules, answer),
                task_text,
                answer,
                judge,
            )
            .await,
        ),
        TaskKind::Proof(rules) => GradeDetails::Text(
            text::grade_text(
                family,
                RubricStyle::LeanComment,
                text::proof_checks(rules, answer),
                task_text,
                answer,
                judge,
            )
            .await,
        ),
        TaskKind::Synthesis(rules) => GradeDetails::Text(
            text::grade_text(
                family,
                RubricStyle::HtmlComment,
                text::synthesis_checks(rules, answer),
                task_text,
                answer,
                judge,
            )
            .await,
        ),
        TaskKind::CodePatch(rules) => {
            let project_root = patch
                .project_root
                .map(Path::to_path_buf)
                .unwrap_or_else(|| find_project_root(&task.path, patch.config.root_marker()));
            GradeDetails::Patch(
                grade_patch(
                    answer,
                    &task.path,
                    &project_root,
                    &rules.allowed_files(),
                    patch.config,
                )
                .await,
            )
        }
    }
}
