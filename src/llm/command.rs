//! Generator backed by an external command.
//!
//! The command template may reference `{model}`, `{task_type}` and
//! `{task_id}`. The rendered command runs under `sh -c` with the prompt on
//! stdin; stdout is the answer.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::error::GenerationError;

/// Runs a shell command per generation call.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    template: String,
    timeout: Option<Duration>,
}

impl CommandGenerator {
    /// Creates a generator from a command template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: None,
        }
    }

    /// Creates a generator from the template stored in `var`, if set and non-empty.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
    }

    /// Bounds each call to `timeout`. The child is killed when it expires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes the request's identity into the template.
    pub fn render(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut command = self.template.clone();
        for (placeholder, value) in [
            ("model", request.model.as_str()),
            ("task_type", request.task_family.as_str()),
            ("task_id", request.task_id.as_str()),
        ] {
            validate_placeholder_value(placeholder, value)?;
            command = command.replace(&format!("{{{}}}", placeholder), value);
        }
        Ok(command)
    }
}

/// Placeholder values are interpolated into a shell command, so only a
/// conservative character set is accepted.
fn validate_placeholder_value(placeholder: &str, value: &str) -> Result<(), GenerationError> {
    let safe = value
        .chars()
        .all(|ch| ch.is_alphanumeric() || "-_.:/@+".contains(ch));
    if safe {
        Ok(())
    } else {
        Err(GenerationError::UnsafeTemplateValue {
            placeholder: placeholder.to_string(),
            value: value.to_string(),
        })
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let command = self.render(request)?;
        debug!(task_id = %request.task_id, "Running model command: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.prompt.clone();
            tokio::spawn(async move {
                // The command may exit without reading its input.
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(error = %e, "Model command closed stdin early");
                }
                let _ = stdin.shutdown().await;
            });
        }

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| GenerationError::Timeout {
                    seconds: timeout.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(GenerationError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
