//! Sandboxed patch grading: safety, workspace, apply, tests, coverage, lint.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::coverage::parse_coverage;
use super::patch::{check_patch_safety, edit_lines};
use super::sandbox::{truncate, SandboxWorkspace, MAX_OUTPUT_CHARS};

/// Tool and file settings for the patch grader.
///
/// Which files a patch may touch is a property of the task, not of this
/// config; see [`PatchRules`](crate::task::PatchRules).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchGraderConfig {
    /// Files copied from the project root into every workspace.
    pub shared_config_files: Vec<String>,
    /// Program used to apply patches.
    pub patch_program: String,
    /// Runs the tests under coverage.
    pub test_command: String,
    /// Prints the coverage table.
    pub coverage_command: String,
    pub lint_command: String,
    /// Minimum total coverage percentage.
    pub min_coverage: f64,
}

impl Default for PatchGraderConfig {
    fn default() -> Self {
        Self {
            shared_config_files: vec!["pyproject.toml".to_string()],
            patch_program: "patch".to_string(),
            test_command: "python -m coverage run -m pytest -q --maxfail=1".to_string(),
            coverage_command: "python -m coverage report -m".to_string(),
            lint_command: "python -m ruff check .".to_string(),
            min_coverage: 90.0,
        }
    }
}

impl PatchGraderConfig {
    pub fn with_min_coverage(mut self, min_coverage: f64) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = command.into();
        self
    }

    pub fn with_coverage_command(mut self, command: impl Into<String>) -> Self {
        self.coverage_command = command.into();
        self
    }

    pub fn with_lint_command(mut self, command: impl Into<String>) -> Self {
        self.lint_command = command.into();
        self
    }

    pub fn with_patch_program(mut self, program: impl Into<String>) -> Self {
        self.patch_program = program.into();
        self
    }

    /// The file name used to locate the project root.
    pub fn root_marker(&self) -> &str {
        self.shared_config_files
            .first()
            .map(String::as_str)
            .unwrap_or("pyproject.toml")
    }
}

/// Pipeline stage of a patch grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStage {
    Safety,
    Workspace,
    Apply,
    Tests,
    Coverage,
    Lint,
    /// Every stage passed.
    Complete,
}

impl fmt::Display for PatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatchStage::Safety => "safety",
            PatchStage::Workspace => "workspace",
            PatchStage::Apply => "apply",
            PatchStage::Tests => "tests",
            PatchStage::Coverage => "coverage",
            PatchStage::Lint => "lint",
            PatchStage::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Grade record for a code patch.
///
/// `stage` is the first failing stage, or `Complete` on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchGrade {
    pub passed: bool,
    pub stage: PatchStage,
    pub patch_applied: bool,
    #[serde(default)]
    pub patch_error: Option<String>,
    #[serde(default)]
    pub tests_ok: Option<bool>,
    #[serde(default)]
    pub coverage_percent: Option<f64>,
    #[serde(default)]
    pub coverage_ok: Option<bool>,
    #[serde(default)]
    pub lint_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_error: Option<String>,
    /// Added plus removed lines; absent when the patch failed safety checks.
    #[serde(default)]
    pub edit_lines: Option<usize>,
}

impl PatchGrade {
    fn rejected(stage: PatchStage, error: String, edit_lines: Option<usize>) -> Self {
        Self {
            passed: false,
            stage,
            patch_applied: false,
            patch_error: Some(error),
            tests_ok: None,
            coverage_percent: None,
            coverage_ok: None,
            lint_ok: None,
            test_output: None,
            test_error: None,
            lint_output: None,
            lint_error: None,
            edit_lines,
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = truncate(text, MAX_OUTPUT_CHARS);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Grades `patch` against the task in `task_dir`.
///
/// Never fails: every problem becomes a failed grade. `task_dir` is only
/// read; all edits happen in a temporary copy removed before returning.
/// `allowed_files` are the only file names the patch may touch.
pub async fn grade_patch(
    patch: &str,
    task_dir: &Path,
    project_root: &Path,
    allowed_files: &[&str],
    config: &PatchGraderConfig,
) -> PatchGrade {
    let safety = check_patch_safety(patch, allowed_files);
    if !safety.safe {
        info!(reason = %safety.reason, "Patch rejected");
        return PatchGrade::rejected(PatchStage::Safety, safety.reason, None);
    }
    let edits = Some(edit_lines(patch));

    let prepared =
        SandboxWorkspace::prepare_blocking(task_dir, project_root, &config.shared_config_files)
            .await;
    let workspace = match prepared {
        Ok(workspace) => workspace,
        Err(e) => {
            warn!(task_dir = %task_dir.display(), error = %e, "Failed to prepare workspace");
            return PatchGrade::rejected(
                PatchStage::Workspace,
                format!("failed to prepare workspace: {}", e),
                edits,
            );
        }
    };

    if let Err(diagnostic) = workspace.apply_patch(&config.patch_program, patch).await {
        info!("Patch did not apply");
        return PatchGrade::rejected(
            PatchStage::Apply,
            truncate(&diagnostic, MAX_OUTPUT_CHARS),
            edits,
        );
    }

    let tests = workspace.run_shell(&config.test_command).await;
    let report = workspace.run_shell(&config.coverage_command).await;
    let coverage_percent = parse_coverage(&report.stdout);
    let coverage_ok = coverage_percent.is_some_and(|pct| pct >= config.min_coverage);
    let lint = workspace.run_shell(&config.lint_command).await;

    let stage = if !tests.success {
        PatchStage::Tests
    } else if !coverage_ok {
        PatchStage::Coverage
    } else if !lint.success {
        PatchStage::Lint
    } else {
        PatchStage::Complete
    };
    let passed = stage == PatchStage::Complete;

    debug!(?coverage_percent, min = config.min_coverage, "Coverage parsed");
    info!(
        tests_ok = tests.success,
        coverage_ok,
        lint_ok = lint.success,
        stage = %stage,
        "Patch graded"
    );

    PatchGrade {
        passed,
        stage,
        patch_applied: true,
        patch_error: None,
        tests_ok: Some(tests.success),
        coverage_percent,
        coverage_ok: Some(coverage_ok),
        lint_ok: Some(lint.success),
        test_output: non_empty(&tests.stdout),
        test_error: non_empty(&tests.stderr),
        lint_output: non_empty(&lint.stdout),
        lint_error: non_empty(&lint.stderr),
        edit_lines: edits,
    }
}
