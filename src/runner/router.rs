//! Per-family model selection from a small sample evaluation.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::executor::{evaluate_task, EvalOptions};
use super::result::TaskResult;
use crate::error::EvalError;
use crate::grader::JudgeClient;
use crate::llm::Generator;
use crate::task::{TaskCatalog, TaskFamily};

/// Sample results backing a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSamples {
    pub py_model: TaskResult,
    pub py_codegen: TaskResult,
    pub md_model: TaskResult,
    pub md_codegen: TaskResult,
}

/// Which model handles which families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Model for code tasks.
    pub code_model: String,
    /// Model for free-text tasks.
    pub logic_model: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<RouteSamples>,
}

impl Route {
    fn single(model: &str, reason: &str, samples: Option<RouteSamples>) -> Self {
        Self {
            code_model: model.to_string(),
            logic_model: model.to_string(),
            reason: reason.to_string(),
            samples,
        }
    }
}

/// Evaluates the first code task and the first general task with both
/// models and splits the work only when each model wins its own family.
///
/// `options.max_tries` is used as given; callers normally pass 1.
pub async fn choose_route(
    catalog: &TaskCatalog,
    generator: &dyn Generator,
    model: &str,
    codegen: &str,
    options: &EvalOptions<'_>,
    judge: Option<&JudgeClient>,
) -> Result<Route, EvalError> {
    let (Some(sample_py), Some(sample_md)) = (
        catalog.tasks(TaskFamily::Py).first(),
        catalog.tasks(TaskFamily::Md).first(),
    ) else {
        info!("Routing skipped: missing sample tasks");
        return Ok(Route::single(model, "missing sample tasks", None));
    };

    let samples = RouteSamples {
        py_model: evaluate_task(sample_py, generator, model, options, judge).await?,
        py_codegen: evaluate_task(sample_py, generator, codegen, options, judge).await?,
        md_model: evaluate_task(sample_md, generator, model, options, judge).await?,
        md_codegen: evaluate_task(sample_md, generator, codegen, options, judge).await?,
    };

    let route = decide(model, codegen, samples);
    info!(
        code_model = %route.code_model,
        logic_model = %route.logic_model,
        reason = %route.reason,
        "Route chosen"
    );
    Ok(route)
}

/// Splits models only when codegen beats model on code and model beats
/// codegen on free text, both by pass@1.
fn decide(model: &str, codegen: &str, samples: RouteSamples) -> Route {
    let codegen_wins_py = samples.py_codegen.pass_at_1 && !samples.py_model.pass_at_1;
    let model_wins_md = samples.md_model.pass_at_1 && !samples.md_codegen.pass_at_1;

    if codegen_wins_py && model_wins_md {
        Route {
            code_model: codegen.to_string(),
            logic_model: model.to_string(),
            reason: "codegen better on py, model better on md".to_string(),
            samples: Some(samples),
        }
    } else {
        Route::single(model, "default to single model", Some(samples))
    }
}
