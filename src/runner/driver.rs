//! Whole-run driver: task selection, routing, resume and report persistence.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{error, info};

use super::config::EvalConfig;
use super::executor::{evaluate_task, EvalOptions};
use super::result::TaskResult;
use super::router::choose_route;
use crate::error::EvalError;
use crate::grader::{JudgeClient, PatchContext};
use crate::llm::Generator;
use crate::report::{ReportWriter, RunMetadata};
use crate::task::{discover_tasks, TaskFamily};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: RunMetadata,
    /// Resumed results followed by the ones evaluated in this run.
    pub results: Vec<TaskResult>,
    /// Tasks evaluated in this run.
    pub evaluated: usize,
    /// Tasks skipped because a previous run already recorded them.
    pub skipped: usize,
}

/// Evaluates every selected task and keeps the reports current.
///
/// Tasks run one at a time in family order (md, py, synth, lean). Reports
/// are rewritten after each task and once more at the end.
pub async fn run_evaluation(
    config: &EvalConfig,
    generator: &dyn Generator,
    judge: Option<&JudgeClient>,
) -> Result<RunOutcome, EvalError> {
    config.validate()?;

    let catalog = discover_tasks(&config.tasks_dir)?;
    let selected = catalog.select(&config.task_types);
    if selected.is_empty() {
        let families: Vec<&str> = config.task_types.iter().map(TaskFamily::as_str).collect();
        return Err(EvalError::NoTasks(families.join(", ")));
    }

    let patch = PatchContext {
        config: &config.patch,
        project_root: config.project_root.as_deref(),
    };

    let run = if config.auto_route {
        let sample_options = EvalOptions {
            max_tries: 1,
            continue_on_error: config.continue_on_error,
            patch,
        };
        let route = choose_route(
            &catalog,
            generator,
            &config.model,
            config.code_model(),
            &sample_options,
            judge,
        )
        .await?;
        RunMetadata::new(
            route.logic_model,
            route.code_model,
            config.max_tries,
            config.min_coverage(),
        )
        .with_route_reason(route.reason)
    } else {
        RunMetadata::new(
            config.model.as_str(),
            config.code_model(),
            config.max_tries,
            config.min_coverage(),
        )
    };
    let run = run
        .with_mock(config.mock)
        .with_task_types(config.task_types.clone());

    let writer = ReportWriter::new(&config.reports_dir);
    let mut results = if config.resume {
        writer.load_results()?
    } else {
        Vec::new()
    };
    let done: HashSet<String> = results.iter().map(|r| r.task_id.clone()).collect();
    let (resumed, pending): (Vec<_>, Vec<_>) = selected
        .into_iter()
        .partition(|task| done.contains(&task.id));
    let skipped = resumed.len();
    if config.resume {
        info!(skipped, pending = pending.len(), "Resuming from existing metrics");
    }

    let options = EvalOptions {
        max_tries: config.max_tries,
        continue_on_error: config.continue_on_error,
        patch,
    };
    let total = pending.len();

    for (i, task) in pending.iter().enumerate() {
        let idx = i + 1;
        let family = task.family();
        let model = if family == TaskFamily::Py {
            run.code_model.as_str()
        } else {
            run.logic_model.as_str()
        };
        info!("[{}/{}] start {} ({}) model={}", idx, total, task.id, family, model);

        let started = Instant::now();
        let result = match evaluate_task(task, generator, model, &options, judge).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "[{}/{}] error {} ({}) after {:.1}s: {}",
                    idx,
                    total,
                    task.id,
                    family,
                    started.elapsed().as_secs_f64(),
                    e
                );
                return Err(e);
            }
        };

        let status = if result.pass_at_k { "PASS" } else { "FAIL" };
        let suffix = result
            .first_generation_error()
            .map(|e| format!(" error={}", e))
            .unwrap_or_default();
        info!(
            "[{}/{}] done {} ({}) status={} elapsed={:.1}s{}",
            idx,
            total,
            task.id,
            family,
            status,
            started.elapsed().as_secs_f64(),
            suffix
        );

        results.push(result);
        writer.write(&run, &results)?;
    }

    writer.write(&run, &results)?;

    Ok(RunOutcome {
        run,
        results,
        evaluated: total,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;
    use crate::report::METRICS_JSON_FILE;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MD_TASK: &str = "Claim.\n<!-- rubric:\nmust: Verdict:\nmust: Proof sketch:\n-->\n";
    const GOOD: &str = "Verdict: false.\nProof sketch: the claim fails at n = 1 by direct substitution.";

    fn setup(root: &Path) {
        fs::create_dir_all(root.join("tasks/md")).unwrap();
        fs::create_dir_all(root.join("tasks/lean")).unwrap();
        fs::write(root.join("tasks/md/t01.md"), MD_TASK).unwrap();
        fs::write(root.join("tasks/md/t02.md"), MD_TASK).unwrap();
        fs::write(root.join("tasks/lean/l01.lean"), "/- rubric:\nmust: theorem\n-/").unwrap();
    }

    fn config(root: &Path) -> EvalConfig {
        EvalConfig::default()
            .with_tasks_dir(root.join("tasks"))
            .with_reports_dir(root.join("reports"))
            .with_max_tries(2)
            .with_task_types(vec![TaskFamily::Md, TaskFamily::Lean])
    }

    #[tokio::test]
    async fn test_runs_selected_families_and_writes_reports() {
        let temp = TempDir::new().unwrap();
        setup(temp.path());
        let generator = MockGenerator::empty().with_answer("t01", GOOD);

        let outcome = run_evaluation(&config(temp.path()), &generator, None)
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t01", "t02", "l01"]);
        assert_eq!(outcome.evaluated, 3);
        assert!(outcome.results[0].pass_at_1);
        assert!(!outcome.results[1].pass_at_k);
        assert!(temp.path().join("reports").join(METRICS_JSON_FILE).is_file());
    }

    #[tokio::test]
    async fn test_resume_skips_recorded_tasks() {
        let temp = TempDir::new().unwrap();
        setup(temp.path());
        let generator = MockGenerator::empty();
        let first = run_evaluation(
            &config(temp.path()).with_task_types(vec![TaskFamily::Md]),
            &generator,
            None,
        )
        .await
        .unwrap();
        assert_eq!(first.evaluated, 2);

        let resumed = run_evaluation(&config(temp.path()).with_resume(true), &generator, None)
            .await
            .unwrap();
        assert_eq!(resumed.skipped, 2);
        assert_eq!(resumed.evaluated, 1);
        assert_eq!(resumed.results.len(), 3);
        assert_eq!(resumed.results[2].task_id, "l01");
    }

    #[tokio::test]
    async fn test_skipped_counts_only_selected_tasks() {
        let temp = TempDir::new().unwrap();
        setup(temp.path());
        let generator = MockGenerator::empty();
        run_evaluation(&config(temp.path()), &generator, None)
            .await
            .unwrap();

        let lean_only = config(temp.path())
            .with_task_types(vec![TaskFamily::Lean])
            .with_resume(true);
        let resumed = run_evaluation(&lean_only, &generator, None).await.unwrap();
        assert_eq!(resumed.skipped, 1);
        assert_eq!(resumed.evaluated, 0);
        assert_eq!(resumed.results.len(), 3);
    }

    #[tokio::test]
    async fn test_no_matching_tasks() {
        let temp = TempDir::new().unwrap();
        setup(temp.path());
        let err = run_evaluation(
            &config(temp.path()).with_task_types(vec![TaskFamily::Synth, TaskFamily::Py]),
            &MockGenerator::empty(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::NoTasks(ref s) if s == "synth, py"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_work() {
        let temp = TempDir::new().unwrap();
        setup(temp.path());
        let err = run_evaluation(
            &config(temp.path()).with_max_tries(0),
            &MockGenerator::empty(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));
        assert!(!temp.path().join("reports").exists());
    }
}
