//! Run reports: summary.md, metrics.json and metrics.csv.
//!
//! Reports are rewritten in full after every task so an interrupted run
//! leaves consistent files behind, and `metrics.json` doubles as the resume
//! checkpoint.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ReportError;
use crate::runner::TaskResult;
use crate::task::TaskFamily;

pub const SUMMARY_FILE: &str = "summary.md";
pub const METRICS_JSON_FILE: &str = "metrics.json";
pub const METRICS_CSV_FILE: &str = "metrics.csv";

/// Run-level metadata stored with every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub logic_model: String,
    pub code_model: String,
    pub max_tries: u32,
    pub min_coverage: f64,
    pub mock: bool,
    pub task_types: Vec<TaskFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_reason: Option<String>,
}

impl RunMetadata {
    pub fn new(
        logic_model: impl Into<String>,
        code_model: impl Into<String>,
        max_tries: u32,
        min_coverage: f64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            logic_model: logic_model.into(),
            code_model: code_model.into(),
            max_tries,
            min_coverage,
            mock: false,
            task_types: TaskFamily::ALL.to_vec(),
            route_reason: None,
        }
    }

    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    pub fn with_task_types(mut self, task_types: Vec<TaskFamily>) -> Self {
        self.task_types = task_types;
        self
    }

    pub fn with_route_reason(mut self, reason: impl Into<String>) -> Self {
        self.route_reason = Some(reason.into());
        self
    }
}

/// A per-task metric averaged across results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    PassAt1,
    PassAtK,
    PassRate,
}

impl Metric {
    fn value(&self, result: &TaskResult) -> f64 {
        match self {
            Metric::PassAt1 => f64::from(u8::from(result.pass_at_1)),
            Metric::PassAtK => f64::from(u8::from(result.pass_at_k)),
            Metric::PassRate => result.pass_rate,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Mean of `metric` over results of `family` (all results when `None`).
pub fn average(results: &[TaskResult], family: Option<TaskFamily>, metric: Metric) -> Option<f64> {
    mean(
        results
            .iter()
            .filter(|r| family.map_or(true, |f| r.family == f))
            .map(|r| metric.value(r)),
    )
}

/// Mean time-to-fix over measured fixes; first-try passes are excluded.
pub fn average_time_to_fix(results: &[TaskResult]) -> Option<f64> {
    mean(results.iter().filter_map(|r| r.time_to_fix.measured()))
}

/// Mean coverage of the last attempt of each code task that reported one.
pub fn average_py_coverage(results: &[TaskResult]) -> Option<f64> {
    mean(
        results
            .iter()
            .filter(|r| r.family == TaskFamily::Py)
            .filter_map(TaskResult::last_coverage),
    )
}

/// One metric overall and per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyBreakdown {
    pub overall: Option<f64>,
    pub md: Option<f64>,
    pub py: Option<f64>,
    pub synth: Option<f64>,
    pub lean: Option<f64>,
}

impl FamilyBreakdown {
    pub fn compute(results: &[TaskResult], metric: Metric) -> Self {
        Self {
            overall: average(results, None, metric),
            md: average(results, Some(TaskFamily::Md), metric),
            py: average(results, Some(TaskFamily::Py), metric),
            synth: average(results, Some(TaskFamily::Synth), metric),
            lean: average(results, Some(TaskFamily::Lean), metric),
        }
    }

    pub fn get(&self, family: TaskFamily) -> Option<f64> {
        match family {
            TaskFamily::Md => self.md,
            TaskFamily::Py => self.py,
            TaskFamily::Synth => self.synth,
            TaskFamily::Lean => self.lean,
        }
    }
}

/// Contents of metrics.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub run: RunMetadata,
    pub results: Vec<TaskResult>,
    pub pass_at_1: FamilyBreakdown,
    pub pass_at_k: FamilyBreakdown,
    pub pass_rate: FamilyBreakdown,
    pub time_to_fix_avg: Option<f64>,
    pub py_coverage_avg: Option<f64>,
}

impl MetricsReport {
    pub fn new(run: &RunMetadata, results: &[TaskResult]) -> Self {
        Self {
            run: run.clone(),
            results: results.to_vec(),
            pass_at_1: FamilyBreakdown::compute(results, Metric::PassAt1),
            pass_at_k: FamilyBreakdown::compute(results, Metric::PassAtK),
            pass_rate: FamilyBreakdown::compute(results, Metric::PassRate),
            time_to_fix_avg: average_time_to_fix(results),
            py_coverage_avg: average_py_coverage(results),
        }
    }
}

fn fmt_rate(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Renders summary.md.
pub fn render_summary(run: &RunMetadata, results: &[TaskResult]) -> String {
    let report = MetricsReport::new(run, results);
    let k = run.max_tries;

    let mut lines = vec![
        "# Summary".to_string(),
        String::new(),
        format!("Run id: {}", run.run_id),
        format!("Run time: {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Model (logic): {}", run.logic_model),
        format!("Model (code): {}", run.code_model),
    ];
    if let Some(reason) = &run.route_reason {
        lines.push(format!("Routing: {}", reason));
    }
    lines.push(format!("Max tries: {}", k));
    lines.push(format!("Min coverage: {:.1}", run.min_coverage));
    if run.mock {
        lines.push("Mock generator: yes".to_string());
    }

    lines.extend([
        String::new(),
        "## Metrics".to_string(),
        String::new(),
        format!("- pass@1 overall: {}", fmt_rate(report.pass_at_1.overall)),
        format!("- pass@{} overall: {}", k, fmt_rate(report.pass_at_k.overall)),
        format!("- avg pass rate overall: {}", fmt_rate(report.pass_rate.overall)),
    ]);
    for family in TaskFamily::ALL {
        lines.push(format!("- pass@1 {}: {}", family, fmt_rate(report.pass_at_1.get(family))));
        lines.push(format!("- pass@{} {}: {}", k, family, fmt_rate(report.pass_at_k.get(family))));
        lines.push(format!(
            "- avg pass rate {}: {}",
            family,
            fmt_rate(report.pass_rate.get(family))
        ));
    }
    lines.push(format!("- avg time-to-fix (sec): {}", fmt_rate(report.time_to_fix_avg)));
    lines.push(format!(
        "- avg py coverage (%): {}",
        report
            .py_coverage_avg
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.1}", v))
    ));

    lines.extend([String::new(), "## Tasks".to_string(), String::new()]);
    for result in results {
        let status = if result.pass_at_k { "PASS" } else { "FAIL" };
        lines.push(format!("- {} ({}): {}", result.task_id, result.family, status));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Renders metrics.csv.
pub fn render_csv(results: &[TaskResult]) -> String {
    let mut out = String::from("task_id,type,model,pass_at_1,pass_at_k,pass_rate,time_to_fix\n");
    for r in results {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_field(&r.task_id),
            r.family,
            csv_field(&r.model),
            r.pass_at_1,
            r.pass_at_k,
            r.pass_rate,
            r.time_to_fix
        ));
    }
    out
}

/// Writes and reloads the report files of one run directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(METRICS_JSON_FILE)
    }

    /// Rewrites all three report files.
    pub fn write(&self, run: &RunMetadata, results: &[TaskResult]) -> Result<(), ReportError> {
        fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let metrics = serde_json::to_string_pretty(&MetricsReport::new(run, results))?;
        self.write_file(SUMMARY_FILE, &render_summary(run, results))?;
        self.write_file(METRICS_JSON_FILE, &metrics)?;
        self.write_file(METRICS_CSV_FILE, &render_csv(results))?;

        debug!(dir = %self.dir.display(), results = results.len(), "Reports written");
        Ok(())
    }

    fn write_file(&self, name: &str, content: &str) -> Result<(), ReportError> {
        let path = self.dir.join(name);
        fs::write(&path, content).map_err(|source| ReportError::Io { path, source })
    }

    /// Results stored in an existing metrics.json; empty when there is none.
    pub fn load_results(&self) -> Result<Vec<TaskResult>, ReportError> {
        #[derive(Deserialize)]
        struct Stored {
            #[serde(default)]
            results: Vec<TaskResult>,
        }

        let path = self.metrics_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        let stored: Stored = serde_json::from_str(&content)?;
        Ok(stored.results)
    }
}
