//! Full runs over the bundled sample tasks with the mock generator.

use std::fs;
use std::path::PathBuf;

use grade_forge::llm::MockGenerator;
use grade_forge::report::{METRICS_CSV_FILE, METRICS_JSON_FILE, SUMMARY_FILE};
use grade_forge::runner::{run_evaluation, EvalConfig};
use grade_forge::task::TaskFamily;
use grade_forge::EvalError;
use tempfile::TempDir;

fn sample_tasks() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tasks")
}

fn text_only_config(reports: &TempDir) -> EvalConfig {
    EvalConfig::default()
        .with_tasks_dir(sample_tasks())
        .with_reports_dir(reports.path())
        .with_max_tries(2)
        .with_mock(true)
        .with_task_types(vec![TaskFamily::Lean, TaskFamily::Synth, TaskFamily::Md])
}

#[tokio::test]
async fn test_mock_run_over_sample_tasks() {
    let reports = TempDir::new().unwrap();
    let outcome = run_evaluation(&text_only_config(&reports), &MockGenerator::default(), None)
        .await
        .unwrap();

    let ids: Vec<&str> = outcome.results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "t01_bigO_edges",
            "t02_polygon_angles",
            "s01_compactness",
            "s04_graph_lemma",
            "l01_np_witness",
        ]
    );

    for result in &outcome.results[..4] {
        assert!(result.pass_at_1, "{} should pass", result.task_id);
        assert_eq!(result.pass_rate, 1.0);
        assert_eq!(result.attempts.len(), 2);
    }
    let lean = &outcome.results[4];
    assert!(!lean.pass_at_k);
    assert_eq!(lean.pass_rate, 0.0);
}

#[tokio::test]
async fn test_reports_are_written() {
    let reports = TempDir::new().unwrap();
    run_evaluation(&text_only_config(&reports), &MockGenerator::default(), None)
        .await
        .unwrap();

    let summary = fs::read_to_string(reports.path().join(SUMMARY_FILE)).unwrap();
    assert!(summary.starts_with("# Summary"));
    assert!(summary.contains("Mock generator: yes"));
    assert!(summary.contains("- pass@1 md: 1.00"));
    assert!(summary.contains("- pass@2 lean: 0.00"));
    assert!(summary.contains("- pass@1 py: n/a"));
    assert!(summary.contains("- l01_np_witness (lean): FAIL"));

    let csv = fs::read_to_string(reports.path().join(METRICS_CSV_FILE)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("task_id,type,model,pass_at_1,pass_at_k,pass_rate,time_to_fix")
    );
    assert_eq!(lines.count(), 5);
    assert!(csv.contains("t01_bigO_edges,md,gpt-5.2,true,true,1,"));

    let metrics: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(reports.path().join(METRICS_JSON_FILE)).unwrap())
            .unwrap();
    assert_eq!(metrics["results"].as_array().unwrap().len(), 5);
    assert_eq!(metrics["run"]["max_tries"], 2);
}

#[tokio::test]
async fn test_resumed_run_keeps_earlier_results() {
    let reports = TempDir::new().unwrap();
    let md_only = text_only_config(&reports).with_task_types(vec![TaskFamily::Md]);
    run_evaluation(&md_only, &MockGenerator::default(), None)
        .await
        .unwrap();

    let resumed = text_only_config(&reports).with_resume(true);
    let outcome = run_evaluation(&resumed, &MockGenerator::default(), None)
        .await
        .unwrap();
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.evaluated, 3);
    assert_eq!(outcome.results.len(), 5);
}

#[tokio::test]
async fn test_missing_tasks_root_is_an_error() {
    let reports = TempDir::new().unwrap();
    let config = text_only_config(&reports).with_tasks_dir(reports.path().join("nope"));

    let err = run_evaluation(&config, &MockGenerator::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Task(_)));
}
