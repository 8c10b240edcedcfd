//! CLI command definitions for grade-forge.
//!
//! `run` evaluates a tasks tree and writes reports, `grade` grades a single
//! answer against a single task, and `list` shows what would be evaluated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::grader::{grade_answer, JudgeClient, PatchContext};
use crate::llm::{
    api_key_from_env, CachedGenerator, CommandGenerator, Generator, MockGenerator,
    OpenAiGenerator, ARBITER_CMD_ENV, MODEL_CMD_ENV,
};
use crate::report::render_summary;
use crate::runner::{run_evaluation, EvalConfig};
use crate::task::{discover_tasks, Task, TaskFamily};

/// Request timeout for the HTTP backend when none is configured.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Benchmark grading engine for model-generated answers.
#[derive(Parser)]
#[command(name = "grade-forge")]
#[command(about = "Grade model answers to benchmark tasks and report pass@k metrics")]
#[command(version)]
#[command(
    long_about = "grade-forge runs a model against free-text and code-patch tasks, grades every attempt, and writes summary.md, metrics.json and metrics.csv.\n\nExample usage:\n  grade-forge run --tasks-dir ./tasks --model gpt-5.2 --max-tries 5 --reports-dir ./reports"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate every selected task and write reports.
    #[command(alias = "eval")]
    Run(RunArgs),

    /// Grade one answer against one task and print the grade as JSON.
    Grade(GradeArgs),

    /// List discovered tasks.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Arguments for `grade-forge run`. Flags override values from `--config`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML run configuration.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Model for free-text tasks.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Model for code tasks (defaults to --model).
    #[arg(long)]
    pub codegen: Option<String>,

    /// Pick models per family from a one-attempt sample run.
    #[arg(long)]
    pub auto_route: bool,

    /// Attempts per task.
    #[arg(short = 'k', long)]
    pub max_tries: Option<u32>,

    /// Minimum coverage percentage for code tasks.
    #[arg(long)]
    pub min_coverage: Option<f64>,

    /// Root directory holding md/, py/, synth/ and lean/.
    #[arg(short = 't', long)]
    pub tasks_dir: Option<PathBuf>,

    /// Directory with shared tool config files for code tasks.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Output directory for reports.
    #[arg(short = 'o', long)]
    pub reports_dir: Option<PathBuf>,

    /// Use canned answers instead of a model.
    #[arg(long)]
    pub mock: bool,

    /// Skip tasks already recorded in the existing metrics.json.
    #[arg(long)]
    pub resume: bool,

    /// Record generation errors as failed attempts instead of aborting.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Comma-separated families to run (md,py,synth,lean).
    #[arg(long)]
    pub task_types: Option<String>,

    /// Cache up to this many judge replies (0 disables).
    #[arg(long)]
    pub judge_cache: Option<usize>,

    /// Per-call timeout for model and judge commands, in seconds.
    #[arg(long)]
    pub generation_timeout: Option<u64>,
}

/// Arguments for `grade-forge grade`.
#[derive(Parser, Debug)]
pub struct GradeArgs {
    /// Task file (md, synth, lean) or task directory (py).
    #[arg(long)]
    pub task: PathBuf,

    /// Task family: md, py, synth or lean.
    #[arg(short = 'f', long)]
    pub family: TaskFamily,

    /// File holding the answer; `-` reads standard input.
    #[arg(short = 'a', long)]
    pub answer: PathBuf,

    /// Minimum coverage percentage for code tasks.
    #[arg(long)]
    pub min_coverage: Option<f64>,

    /// Directory with shared tool config files for code tasks.
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// YAML run configuration to take patch tool settings from.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `grade-forge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Root directory holding md/, py/, synth/ and lean/.
    #[arg(short = 't', long, default_value = "tasks")]
    pub tasks_dir: PathBuf,

    /// Comma-separated families to list.
    #[arg(long)]
    pub task_types: Option<String>,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments without running any command.
///
/// Lets the caller read `log_level` before logging is initialized.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_run_command(args).await,
        Commands::Grade(args) => run_grade_command(args).await,
        Commands::List(args) => run_list_command(args),
    }
}

// ============================================================================
// Run
// ============================================================================

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_run_overrides(&mut config, &args)?;

    let generator = build_generator(&mut config)?;
    let judge = build_judge(config.judge_cache_capacity, config.generation_timeout());
    if judge.is_none() {
        info!("{} not set, free-text grading uses the rubric only", ARBITER_CMD_ENV);
    }

    let outcome = run_evaluation(&config, generator.as_ref(), judge.as_ref()).await?;

    info!(
        evaluated = outcome.evaluated,
        skipped = outcome.skipped,
        reports = %config.reports_dir.display(),
        "Run complete"
    );
    println!("{}", render_summary(&outcome.run, &outcome.results));
    println!("Reports written to {}", config.reports_dir.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EvalConfig> {
    match path {
        Some(path) => EvalConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EvalConfig::default()),
    }
}

fn apply_run_overrides(config: &mut EvalConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(codegen) = &args.codegen {
        config.codegen_model = Some(codegen.clone());
    }
    if let Some(max_tries) = args.max_tries {
        config.max_tries = max_tries;
    }
    if let Some(min_coverage) = args.min_coverage {
        config.patch.min_coverage = min_coverage;
    }
    if let Some(dir) = &args.tasks_dir {
        config.tasks_dir = dir.clone();
    }
    if let Some(dir) = &args.project_root {
        config.project_root = Some(dir.clone());
    }
    if let Some(dir) = &args.reports_dir {
        config.reports_dir = dir.clone();
    }
    if let Some(list) = &args.task_types {
        config.task_types = TaskFamily::parse_list(list)?;
    }
    if let Some(capacity) = args.judge_cache {
        config.judge_cache_capacity = capacity;
    }
    if let Some(secs) = args.generation_timeout {
        config.generation_timeout_secs = Some(secs);
    }
    config.auto_route |= args.auto_route;
    config.mock |= args.mock;
    config.resume |= args.resume;
    config.continue_on_error |= args.continue_on_error;
    Ok(())
}

/// Picks the answer backend: canned answers when asked for, then the model
/// command, then the HTTP API, then canned answers again.
fn build_generator(config: &mut EvalConfig) -> anyhow::Result<Arc<dyn Generator>> {
    if config.mock {
        info!("Using mock generator");
        return Ok(Arc::new(MockGenerator::default()));
    }

    if let Some(mut command) = CommandGenerator::from_env(MODEL_CMD_ENV) {
        if let Some(timeout) = config.generation_timeout() {
            command = command.with_timeout(timeout);
        }
        info!(template = command.template(), "Using model command");
        return Ok(Arc::new(command));
    }

    if api_key_from_env().is_some() {
        let timeout = config.generation_timeout().unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let generator = OpenAiGenerator::from_env(timeout)?;
        info!(api_base = generator.api_base(), "Using chat completions API");
        return Ok(Arc::new(generator));
    }

    warn!(
        "Neither {} nor a non-empty OPENAI_API_KEY is set, falling back to mock answers",
        MODEL_CMD_ENV
    );
    config.mock = true;
    Ok(Arc::new(MockGenerator::default()))
}

fn build_judge(cache_capacity: usize, timeout: Option<Duration>) -> Option<JudgeClient> {
    let mut command = CommandGenerator::from_env(ARBITER_CMD_ENV)?;
    if let Some(timeout) = timeout {
        command = command.with_timeout(timeout);
    }
    info!(template = command.template(), cache_capacity, "Judge enabled");

    let generator: Arc<dyn Generator> = if cache_capacity > 0 {
        Arc::new(CachedGenerator::new(command, cache_capacity))
    } else {
        Arc::new(command)
    };
    Some(JudgeClient::new(generator))
}

// ============================================================================
// Grade
// ============================================================================

async fn run_grade_command(args: GradeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(min_coverage) = args.min_coverage {
        config.patch.min_coverage = min_coverage;
    }
    if let Some(dir) = &args.project_root {
        config.project_root = Some(dir.clone());
    }
    config.validate()?;

    let id = task_id_from_path(&args.task)?;
    let task = Task::new(id, args.family, &args.task);
    let task_text = task.build_prompt()?;
    let answer = read_answer(&args.answer).await?;
    let judge = build_judge(config.judge_cache_capacity, config.generation_timeout());

    let details = grade_answer(
        &task,
        &task_text,
        &answer,
        judge.as_ref(),
        PatchContext {
            config: &config.patch,
            project_root: config.project_root.as_deref(),
        },
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

fn task_id_from_path(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("Task path does not exist: {}", path.display());
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Cannot derive a task id from {}", path.display()))
}

async fn read_answer(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut answer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut answer)
            .await
            .context("Failed to read answer from stdin")?;
        return Ok(answer);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read answer file {}", path.display()))
}

// ============================================================================
// List
// ============================================================================

fn run_list_command(args: ListArgs) -> anyhow::Result<()> {
    let families = match &args.task_types {
        Some(list) => TaskFamily::parse_list(list)?,
        None => TaskFamily::ALL.to_vec(),
    };
    let catalog = discover_tasks(&args.tasks_dir)?;
    let tasks = catalog.select(&families);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    for task in &tasks {
        println!("{:<6} {:<24} {}", task.family(), task.id, task.path.display());
    }
    println!("{} task(s)", tasks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_run_flags_override_config() {
        let cli = parse(&[
            "grade-forge",
            "run",
            "--model",
            "logic",
            "--codegen",
            "coder",
            "-k",
            "3",
            "--min-coverage",
            "75",
            "--task-types",
            "lean,md",
            "--resume",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let mut config = EvalConfig::default().with_max_tries(9);
        apply_run_overrides(&mut config, &args).unwrap();
        assert_eq!(config.model, "logic");
        assert_eq!(config.code_model(), "coder");
        assert_eq!(config.max_tries, 3);
        assert_eq!(config.min_coverage(), 75.0);
        assert_eq!(config.task_types, vec![TaskFamily::Lean, TaskFamily::Md]);
        assert!(config.resume);
        assert!(!config.mock);
    }

    #[test]
    fn test_unset_flags_keep_config_values() {
        let cli = parse(&["grade-forge", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };

        let mut config = EvalConfig::default().with_max_tries(9).with_mock(true);
        apply_run_overrides(&mut config, &args).unwrap();
        assert_eq!(config.max_tries, 9);
        assert!(config.mock);
        assert_eq!(config.code_model(), "gpt-5.2");
    }

    #[test]
    fn test_unknown_family_is_rejected() {
        let cli = parse(&["grade-forge", "run", "--task-types", "md,rust"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let mut config = EvalConfig::default();
        assert!(apply_run_overrides(&mut config, &args).is_err());
        assert!(Cli::try_parse_from(["grade-forge", "grade", "--task", "t.md", "-f", "rust", "-a", "a"]).is_err());
    }

    #[test]
    fn test_global_log_level() {
        let cli = parse(&["grade-forge", "list", "--log-level", "debug"]);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::List(_)));
    }

    #[test]
    fn test_task_id_from_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("t01_bigO_edges.md");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(task_id_from_path(&file).unwrap(), "t01_bigO_edges");
        assert!(task_id_from_path(&temp.path().join("missing.md")).is_err());
    }
}
