//! Disposable workspaces and external tool execution for patch grading.
//!
//! A [`SandboxWorkspace`] owns a uniquely named temporary directory:
//!
//! ```text
//! grade-forge-XXXXXX/
//!   candidate.patch     patch text, outside the task copy
//!   task/               copy of the task directory + shared config files
//! ```
//!
//! The directory is removed when the workspace is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum characters of tool output kept in a grade.
pub const MAX_OUTPUT_CHARS: usize = 10_000;

const PATCH_FILE: &str = "candidate.patch";
const TASK_DIR: &str = "task";

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    fn spawn_failure(program: &str, error: &std::io::Error) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("failed to run '{}': {}", program, error),
        }
    }

    /// Stderr if non-empty, else stdout, trimmed.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// A fresh copy of a task directory in a temporary location.
#[derive(Debug)]
pub struct SandboxWorkspace {
    root: TempDir,
    task_dir: PathBuf,
}

impl SandboxWorkspace {
    /// Copies `task_dir` and the shared config files found in `project_root`.
    ///
    /// Missing shared config files are skipped.
    pub fn prepare(
        task_dir: &Path,
        project_root: &Path,
        shared_config_files: &[String],
    ) -> std::io::Result<Self> {
        let root = tempfile::Builder::new().prefix("grade-forge-").tempdir()?;
        let copy = root.path().join(TASK_DIR);
        copy_dir_recursive(task_dir, &copy)?;

        for name in shared_config_files {
            let source = project_root.join(name);
            if source.is_file() {
                std::fs::copy(&source, copy.join(name))?;
            } else {
                debug!(file = %source.display(), "Shared config file not found, skipping");
            }
        }

        debug!(workspace = %root.path().display(), "Prepared sandbox workspace");
        Ok(Self {
            root,
            task_dir: copy,
        })
    }

    /// [`prepare`](Self::prepare) on the blocking thread pool.
    pub async fn prepare_blocking(
        task_dir: &Path,
        project_root: &Path,
        shared_config_files: &[String],
    ) -> std::io::Result<Self> {
        let task_dir = task_dir.to_path_buf();
        let project_root = project_root.to_path_buf();
        let shared_config_files = shared_config_files.to_vec();
        tokio::task::spawn_blocking(move || {
            Self::prepare(&task_dir, &project_root, &shared_config_files)
        })
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)))
    }

    /// Root of the temporary directory.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// The copied task directory, where tools run.
    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }

    /// Applies `patch` with `program`, trying strip levels 0 then 1.
    ///
    /// Each level is dry-run first so a failing level leaves no partial
    /// edits. Returns the tool diagnostic of the last attempt on failure.
    pub async fn apply_patch(&self, program: &str, patch: &str) -> Result<(), String> {
        let patch_file = self.root.path().join(PATCH_FILE);
        tokio::fs::write(&patch_file, patch)
            .await
            .map_err(|e| format!("failed to write patch file: {}", e))?;
        let patch_arg = patch_file.to_string_lossy().to_string();

        let mut last = String::new();
        for strip in [0, 1] {
            let level = format!("-p{}", strip);
            let dry_run = run_tool(
                program,
                &["--dry-run", "--batch", &level, "-s", "-i", &patch_arg],
                &self.task_dir,
            )
            .await;
            if !dry_run.success {
                last = dry_run.diagnostic();
                continue;
            }

            let applied = run_tool(
                program,
                &["--batch", &level, "-s", "-i", &patch_arg],
                &self.task_dir,
            )
            .await;
            if applied.success {
                debug!(strip, "Patch applied");
                return Ok(());
            }
            last = applied.diagnostic();
        }
        Err(last)
    }

    /// Runs a shell command line in the task copy.
    pub async fn run_shell(&self, command: &str) -> ToolOutput {
        run_tool("sh", &["-c", command], &self.task_dir).await
    }
}

/// Runs `program` with `args` in `cwd`, capturing output.
///
/// A spawn failure is reported as an unsuccessful run with the error as
/// stderr.
pub async fn run_tool(program: &str, args: &[&str], cwd: &Path) -> ToolOutput {
    debug!(program, ?args, cwd = %cwd.display(), "Running tool");
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) => ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Err(e) => {
            warn!(program, error = %e, "Failed to spawn tool");
            ToolOutput::spawn_failure(program, &e)
        }
    }
}

/// Nearest ancestor of `task_dir` (itself included) containing `marker`,
/// else `task_dir`.
pub fn find_project_root(task_dir: &Path, marker: &str) -> PathBuf {
    let start = task_dir
        .canonicalize()
        .unwrap_or_else(|_| task_dir.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_file())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| task_dir.to_path_buf())
}

/// Trims and keeps at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}... [truncated]", &s[..end]),
        None => s.to_string(),
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !dst.exists() {
        std::fs::create_dir_all(dst)?;
    }

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&path, &dest_path)?;
        } else {
            std::fs::copy(&path, &dest_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_task(root: &Path) -> PathBuf {
        let task = root.join("tasks/py/r01");
        fs::create_dir_all(task.join("data")).unwrap();
        fs::write(task.join("impl.py"), "x = 1\n").unwrap();
        fs::write(task.join("data/input.txt"), "abc").unwrap();
        fs::write(root.join("pyproject.toml"), "[tool.ruff]\n").unwrap();
        task
    }

    #[test]
    fn test_prepare_copies_task_and_config() {
        let temp = TempDir::new().unwrap();
        let task = make_task(temp.path());
        let files = vec!["pyproject.toml".to_string(), "setup.cfg".to_string()];

        let workspace = SandboxWorkspace::prepare(&task, temp.path(), &files).unwrap();
        let copy = workspace.task_dir();
        assert_eq!(fs::read_to_string(copy.join("impl.py")).unwrap(), "x = 1\n");
        assert_eq!(fs::read_to_string(copy.join("data/input.txt")).unwrap(), "abc");
        assert!(copy.join("pyproject.toml").is_file());
        assert!(!copy.join("setup.cfg").exists());
        assert!(!task.join("pyproject.toml").exists());
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let task = make_task(temp.path());

        let workspace = SandboxWorkspace::prepare(&task, temp.path(), &[]).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_fails_for_missing_task() {
        let temp = TempDir::new().unwrap();
        let result = SandboxWorkspace::prepare(&temp.path().join("nope"), temp.path(), &[]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_prepare_blocking_copies_task() {
        let temp = TempDir::new().unwrap();
        let task = make_task(temp.path());
        let files = vec!["pyproject.toml".to_string()];

        let workspace = SandboxWorkspace::prepare_blocking(&task, temp.path(), &files)
            .await
            .unwrap();
        assert!(workspace.task_dir().join("impl.py").is_file());
        assert!(workspace.task_dir().join("pyproject.toml").is_file());

        let missing =
            SandboxWorkspace::prepare_blocking(&temp.path().join("nope"), temp.path(), &[]).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_find_project_root() {
        let temp = TempDir::new().unwrap();
        let task = make_task(temp.path());
        let expected = temp.path().canonicalize().unwrap();
        assert_eq!(find_project_root(&task, "pyproject.toml"), expected);
        assert_eq!(find_project_root(&task, "no-such-marker.cfg"), task);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("  short  ", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé... [truncated]");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[tokio::test]
    async fn test_run_tool_captures_and_reports_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let ok = run_tool("sh", &["-c", "echo out; echo err >&2; exit 1"], temp.path()).await;
        assert!(!ok.success);
        assert_eq!(ok.stdout.trim(), "out");
        assert_eq!(ok.diagnostic(), "err");

        let missing = run_tool("definitely-not-a-real-binary", &[], temp.path()).await;
        assert!(!missing.success);
        assert!(missing.stderr.contains("failed to run"));
    }

    #[tokio::test]
    async fn test_run_shell_uses_task_copy() {
        let temp = TempDir::new().unwrap();
        let task = make_task(temp.path());
        let workspace = SandboxWorkspace::prepare(&task, temp.path(), &[]).unwrap();

        let out = workspace.run_shell("cat impl.py").await;
        assert!(out.success);
        assert_eq!(out.stdout, "x = 1\n");
    }
}
