//! Benchmark tasks: families, per-family grading rules, discovery and prompts.
//!
//! A tasks root is laid out as:
//!
//! ```text
//! tasks/
//!   md/<id>.md          general free-text tasks
//!   lean/<id>.lean      formal-proof tasks
//!   synth/<id>.md       synthesis tasks
//!   py/<id>/impl.py     code-patch tasks (with tests.py alongside)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ConfigError, TaskError};

/// Serialization tag of a task family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFamily {
    /// General free text (claims, proof sketches).
    Md,
    /// Code-modification task graded in a sandbox.
    Py,
    /// Short synthesis essay.
    Synth,
    /// Formal-proof obligation.
    Lean,
}

impl TaskFamily {
    /// All families in run order.
    pub const ALL: [TaskFamily; 4] = [
        TaskFamily::Md,
        TaskFamily::Py,
        TaskFamily::Synth,
        TaskFamily::Lean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFamily::Md => "md",
            TaskFamily::Py => "py",
            TaskFamily::Synth => "synth",
            TaskFamily::Lean => "lean",
        }
    }

    /// Parses a comma-separated family list such as `md,py`.
    pub fn parse_list(list: &str) -> Result<Vec<TaskFamily>, ConfigError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TaskFamily::from_str)
            .collect()
    }
}

impl fmt::Display for TaskFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" => Ok(TaskFamily::Md),
            "py" => Ok(TaskFamily::Py),
            "synth" => Ok(TaskFamily::Synth),
            "lean" => Ok(TaskFamily::Lean),
            other => Err(ConfigError::UnknownFamily(other.to_string())),
        }
    }
}

/// Format rules for general free-text answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRules {
    /// Minimum trimmed answer length in characters.
    pub min_chars: usize,
}

impl Default for TextRules {
    fn default() -> Self {
        Self { min_chars: 60 }
    }
}

/// Format rules for formal-proof answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRules {
    /// Minimum trimmed answer length in characters.
    pub min_chars: usize,
    /// Reject answers containing fenced code-block markers.
    pub forbid_fences: bool,
}

impl Default for ProofRules {
    fn default() -> Self {
        Self {
            min_chars: 80,
            forbid_fences: true,
        }
    }
}

/// Format rules for synthesis answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRules {
    pub min_words: usize,
    pub max_words: usize,
    pub min_paragraphs: usize,
    pub max_paragraphs: usize,
}

impl Default for SynthesisRules {
    fn default() -> Self {
        Self {
            min_words: 40,
            max_words: 220,
            min_paragraphs: 1,
            max_paragraphs: 2,
        }
    }
}

/// The two files a code-patch task consists of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRules {
    pub impl_file: String,
    pub test_file: String,
}

impl PatchRules {
    /// Filenames a patch may touch.
    pub fn allowed_files(&self) -> [&str; 2] {
        [self.impl_file.as_str(), self.test_file.as_str()]
    }
}

impl Default for PatchRules {
    fn default() -> Self {
        Self {
            impl_file: "impl.py".to_string(),
            test_file: "tests.py".to_string(),
        }
    }
}

/// What kind of task this is, together with the rules its grader applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TaskKind {
    General(TextRules),
    Proof(ProofRules),
    Synthesis(SynthesisRules),
    CodePatch(PatchRules),
}

impl TaskKind {
    /// Default rules for a family.
    pub fn for_family(family: TaskFamily) -> Self {
        match family {
            TaskFamily::Md => TaskKind::General(TextRules::default()),
            TaskFamily::Lean => TaskKind::Proof(ProofRules::default()),
            TaskFamily::Synth => TaskKind::Synthesis(SynthesisRules::default()),
            TaskFamily::Py => TaskKind::CodePatch(PatchRules::default()),
        }
    }

    pub fn family(&self) -> TaskFamily {
        match self {
            TaskKind::General(_) => TaskFamily::Md,
            TaskKind::Proof(_) => TaskFamily::Lean,
            TaskKind::Synthesis(_) => TaskFamily::Synth,
            TaskKind::CodePatch(_) => TaskFamily::Py,
        }
    }
}

/// A benchmark task. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (file stem or directory name).
    pub id: String,
    /// Family and grading rules.
    pub kind: TaskKind,
    /// Task file for free-text tasks, task directory for code tasks.
    pub path: PathBuf,
}

impl Task {
    /// Creates a task with the default rules of its family.
    pub fn new(id: impl Into<String>, family: TaskFamily, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::for_family(family),
            path: path.into(),
        }
    }

    pub fn family(&self) -> TaskFamily {
        self.kind.family()
    }

    /// Builds the prompt sent to the generator.
    pub fn build_prompt(&self) -> Result<String, TaskError> {
        let rules = match &self.kind {
            TaskKind::CodePatch(rules) => rules,
            _ => return read_file(&self.path),
        };

        let implementation = read_file(&self.path.join(&rules.impl_file))?;
        let tests = read_file(&self.path.join(&rules.test_file))?;
        Ok(format!(
            "You are asked to refactor code and add tests.\n\
             - Preserve behavior unless explicitly stated.\n\
             - Improve naming and decomposition.\n\
             - Add or expand pytest tests.\n\
             - Keep the API stable.\n\n\
             Return a unified diff patch relative to the task folder.\n\
             Only edit {impl_file} and {test_file}.\n\
             Output only the diff, no code fences or extra text.\n\n\
             {impl_file}:\n```python\n{implementation}\n```\n\n\
             {test_file}:\n```python\n{tests}\n```\n",
            impl_file = rules.impl_file,
            test_file = rules.test_file,
        ))
    }
}

fn read_file(path: &Path) -> Result<String, TaskError> {
    fs::read_to_string(path).map_err(|source| TaskError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Tasks found under a tasks root, grouped by family.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    by_family: HashMap<TaskFamily, Vec<Task>>,
}

impl TaskCatalog {
    /// Tasks of one family, sorted by id.
    pub fn tasks(&self, family: TaskFamily) -> &[Task] {
        self.by_family
            .get(&family)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tasks of the requested families, in the fixed run order.
    pub fn select(&self, families: &[TaskFamily]) -> Vec<Task> {
        TaskFamily::ALL
            .iter()
            .filter(|family| families.contains(family))
            .flat_map(|family| self.tasks(*family).iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_family.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Discovers all tasks below `root`. Missing family directories yield no tasks.
pub fn discover_tasks(root: &Path) -> Result<TaskCatalog, TaskError> {
    if !root.is_dir() {
        return Err(TaskError::MissingRoot(root.to_path_buf()));
    }

    let mut catalog = TaskCatalog::default();
    catalog
        .by_family
        .insert(TaskFamily::Md, file_tasks(&root.join("md"), "md", TaskFamily::Md)?);
    catalog.by_family.insert(
        TaskFamily::Lean,
        file_tasks(&root.join("lean"), "lean", TaskFamily::Lean)?,
    );
    catalog.by_family.insert(
        TaskFamily::Synth,
        file_tasks(&root.join("synth"), "md", TaskFamily::Synth)?,
    );
    catalog
        .by_family
        .insert(TaskFamily::Py, patch_tasks(&root.join("py"))?);

    debug!(root = %root.display(), count = catalog.len(), "Discovered tasks");
    Ok(catalog)
}

fn file_tasks(dir: &Path, extension: &str, family: TaskFamily) -> Result<Vec<Task>, TaskError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut tasks = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(extension)
        {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            tasks.push(Task::new(stem, family, path));
        }
    }
    Ok(tasks)
}

fn patch_tasks(dir: &Path) -> Result<Vec<Task>, TaskError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let rules = PatchRules::default();
    let mut tasks = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_dir() {
            continue;
        }
        let complete = rules
            .allowed_files()
            .iter()
            .all(|file| path.join(file).is_file());
        if !complete {
            debug!(path = %path.display(), "Skipping incomplete code task directory");
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            tasks.push(Task::new(name, TaskFamily::Py, path));
        }
    }
    Ok(tasks)
}
