//! Answer generation backends.
//!
//! Every backend implements [`Generator`]: given a prompt and the identity of
//! the model and task, return the answer text or fail. The same interface is
//! used for the external judge, which only inspects the reply text.
//!
//! ```ignore
//! use grade_forge::llm::{CommandGenerator, GenerationRequest, Generator};
//!
//! let generator = CommandGenerator::new("my-model-cli --model {model}");
//! let request = GenerationRequest::new("prompt", "gpt-5.2", "md", "t01_bigO");
//! let answer = generator.generate(&request).await?;
//! ```

pub mod cache;
pub mod command;
pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub use cache::{CacheStats, CachedGenerator, ContentHash, LruCache};
pub use command::CommandGenerator;
pub use mock::MockGenerator;
pub use openai::{api_key_from_env, OpenAiGenerator};

/// Environment variable holding the model command template.
pub const MODEL_CMD_ENV: &str = "GRADE_FORGE_MODEL_CMD";

/// Environment variable holding the judge command template.
pub const ARBITER_CMD_ENV: &str = "GRADE_FORGE_ARBITER_CMD";

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Full prompt text.
    pub prompt: String,
    /// Model identifier.
    pub model: String,
    /// Task family tag (`md`, `py`, ... or `arbiter` for the judge).
    pub task_family: String,
    /// Task identifier.
    pub task_id: String,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        task_family: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            task_family: task_family.into(),
            task_id: task_id.into(),
        }
    }
}

/// Trait for backends that turn a prompt into answer text.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate an answer for the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request).await
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        (**self).generate(request).await
    }
}
