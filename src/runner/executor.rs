//! Attempt orchestration for a single task.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::result::{Attempt, TaskResult};
use crate::error::EvalError;
use crate::grader::{grade_answer, JudgeClient, PatchContext};
use crate::llm::{GenerationRequest, Generator};
use crate::task::Task;

/// Per-task evaluation settings.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions<'a> {
    pub max_tries: u32,
    pub continue_on_error: bool,
    pub patch: PatchContext<'a>,
}

/// Runs up to `max_tries` generate-and-grade attempts on `task`.
///
/// Attempts run sequentially and all requested attempts are made, even
/// after a pass, so `pass_rate` reflects every try.
///
/// # Errors
///
/// Unreadable task files abort. Generation errors abort unless
/// `continue_on_error` is set, in which case the attempt is graded with an
/// empty answer and forced to fail.
pub async fn evaluate_task(
    task: &Task,
    generator: &dyn Generator,
    model: &str,
    options: &EvalOptions<'_>,
    judge: Option<&JudgeClient>,
) -> Result<TaskResult, EvalError> {
    let family = task.family();
    let start = Instant::now();
    let mut attempts = Vec::with_capacity(options.max_tries as usize);

    for n in 1..=options.max_tries {
        let attempt_start = Instant::now();
        // Free-text prompts are the raw task text, which also carries the rubric.
        let prompt = task.build_prompt()?;
        debug!(task_id = %task.id, attempt = n, chars = prompt.chars().count(), "Built prompt");

        let request = GenerationRequest::new(prompt, model, family.as_str(), task.id.as_str());
        let (answer, generation_error) = match generator.generate(&request).await {
            Ok(answer) => (answer, None),
            Err(e) if options.continue_on_error => {
                warn!(task_id = %task.id, attempt = n, error = %e, "Generation failed, recording failed attempt");
                (String::new(), Some(e.marker()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut details =
            grade_answer(task, &request.prompt, &answer, judge, options.patch).await;
        if generation_error.is_some() {
            details.fail();
        }
        let passed = details.passed();

        info!(task_id = %task.id, attempt = n, passed, "Attempt graded");
        attempts.push(Attempt {
            attempt: n,
            passed,
            details,
            elapsed_secs: attempt_start.elapsed().as_secs_f64(),
            finished_at_secs: start.elapsed().as_secs_f64(),
            output_chars: answer.chars().count(),
            generation_error,
        });
    }

    Ok(TaskResult::from_attempts(
        task.id.clone(),
        family,
        model,
        options.max_tries,
        attempts,
        start.elapsed().as_secs_f64(),
    ))
}
