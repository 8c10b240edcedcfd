//! Configuration for evaluation runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grader::PatchGraderConfig;
use crate::task::TaskFamily;

/// Settings for one evaluation run.
///
/// Loadable from YAML; every field has a default so partial files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Root directory containing `md/`, `py/`, `synth/` and `lean/`.
    pub tasks_dir: PathBuf,
    /// Directory holding shared config files. Discovered per task when unset.
    pub project_root: Option<PathBuf>,
    /// Where summary.md, metrics.json and metrics.csv are written.
    pub reports_dir: PathBuf,
    /// Model for free-text families.
    pub model: String,
    /// Model for code tasks; defaults to `model`.
    pub codegen_model: Option<String>,
    /// Attempts per task.
    pub max_tries: u32,
    /// Turn generation errors into failed attempts instead of aborting.
    pub continue_on_error: bool,
    /// Families to run; always executed in the fixed family order.
    pub task_types: Vec<TaskFamily>,
    /// Skip tasks already present in the existing metrics.json.
    pub resume: bool,
    /// Choose models per family from a sample evaluation.
    pub auto_route: bool,
    /// Use canned answers instead of a real model.
    pub mock: bool,
    /// Memoized judge replies; 0 disables the cache.
    pub judge_cache_capacity: usize,
    /// Per-call limit for command generators.
    pub generation_timeout_secs: Option<u64>,
    /// Patch grader tools and thresholds.
    pub patch: PatchGraderConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("tasks"),
            project_root: None,
            reports_dir: PathBuf::from("reports"),
            model: "gpt-5.2".to_string(),
            codegen_model: None,
            max_tries: 5,
            continue_on_error: false,
            task_types: TaskFamily::ALL.to_vec(),
            resume: false,
            auto_route: false,
            mock: false,
            judge_cache_capacity: 0,
            generation_timeout_secs: None,
            patch: PatchGraderConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Loads a YAML config file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn with_tasks_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tasks_dir = dir.into();
        self
    }

    pub fn with_project_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_root = Some(dir.into());
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_codegen_model(mut self, model: impl Into<String>) -> Self {
        self.codegen_model = Some(model.into());
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_min_coverage(mut self, min_coverage: f64) -> Self {
        self.patch.min_coverage = min_coverage;
        self
    }

    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub fn with_task_types(mut self, families: Vec<TaskFamily>) -> Self {
        self.task_types = families;
        self
    }

    pub fn with_resume(mut self, enabled: bool) -> Self {
        self.resume = enabled;
        self
    }

    pub fn with_auto_route(mut self, enabled: bool) -> Self {
        self.auto_route = enabled;
        self
    }

    pub fn with_mock(mut self, enabled: bool) -> Self {
        self.mock = enabled;
        self
    }

    pub fn with_judge_cache_capacity(mut self, capacity: usize) -> Self {
        self.judge_cache_capacity = capacity;
        self
    }

    pub fn with_patch_config(mut self, patch: PatchGraderConfig) -> Self {
        self.patch = patch;
        self
    }

    pub fn min_coverage(&self) -> f64 {
        self.patch.min_coverage
    }

    /// Model used for code tasks.
    pub fn code_model(&self) -> &str {
        self.codegen_model.as_deref().unwrap_or(&self.model)
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs.map(Duration::from_secs)
    }

    /// Rejects settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tries == 0 {
            return Err(invalid("max_tries", "must be at least 1"));
        }
        let min = self.patch.min_coverage;
        if !min.is_finite() || min < 0.0 {
            return Err(invalid("min_coverage", "must be a non-negative number"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty"));
        }
        if self.task_types.is_empty() {
            return Err(invalid("task_types", "must name at least one family"));
        }
        for (field, value) in [
            ("patch.patch_program", &self.patch.patch_program),
            ("patch.test_command", &self.patch.test_command),
            ("patch.coverage_command", &self.patch.coverage_command),
            ("patch.lint_command", &self.patch.lint_command),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
