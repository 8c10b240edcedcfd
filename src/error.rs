//! Error types for grade-forge operations.
//!
//! Grading outcomes (unsafe patches, failing tools, ambiguous judges) are
//! reported as failed grades, not errors. The types here cover what can
//! genuinely abort work:
//! - Task discovery and task file access
//! - Answer generation (command, HTTP and mock backends)
//! - Configuration loading and validation
//! - Report persistence
//! - Run-level orchestration

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering or reading tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Tasks root '{0}' does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("Failed to read task file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors that can occur while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model command failed (code {code}): {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("Failed to spawn model command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Generation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Unsafe value '{value}' for template placeholder '{placeholder}'")]
    UnsafeTemplateValue { placeholder: String, value: String },

    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse model response: {0}")]
    ParseError(String),
}

impl GenerationError {
    /// Short name of the error variant, used as the attempt error marker prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::CommandFailed { .. } => "CommandFailed",
            GenerationError::Spawn(_) => "Spawn",
            GenerationError::Timeout { .. } => "Timeout",
            GenerationError::UnsafeTemplateValue { .. } => "UnsafeTemplateValue",
            GenerationError::MissingApiKey => "MissingApiKey",
            GenerationError::RequestFailed(_) => "RequestFailed",
            GenerationError::ApiError { .. } => "ApiError",
            GenerationError::ParseError(_) => "ParseError",
        }
    }

    /// Renders the error as `<Kind>: <message>`.
    pub fn marker(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown task family '{0}': must be one of md, py, synth, lean")]
    UnknownFamily(String),
}

/// Errors that can occur while writing or reading reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run-level errors that abort an evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("No tasks found for types: {0}")]
    NoTasks(String),
}
