//! Static inspection of unified diffs, done before anything touches disk.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Safety verdict for a patch. `reason` is empty when safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSafety {
    pub safe: bool,
    pub reason: String,
}

impl PatchSafety {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: String::new(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: reason.into(),
        }
    }
}

/// Paths named in `--- ` and `+++ ` header lines, in order.
///
/// `/dev/null` is skipped and one leading `a/` or `b/` is stripped.
pub fn extract_patch_paths(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter(|line| line.starts_with("--- ") || line.starts_with("+++ "))
        .filter_map(|line| {
            let raw = line[4..].trim();
            let path = raw.split('\t').next().unwrap_or(raw);
            if path == "/dev/null" {
                return None;
            }
            let path = path
                .strip_prefix("a/")
                .or_else(|| path.strip_prefix("b/"))
                .unwrap_or(path);
            Some(path.to_string())
        })
        .collect()
}

/// Checks that a patch only touches allowed files via relative paths.
pub fn check_patch_safety(patch: &str, allowed_files: &[&str]) -> PatchSafety {
    if patch.trim().is_empty() {
        return PatchSafety::reject("empty patch");
    }

    let paths = extract_patch_paths(patch);
    if paths.is_empty() {
        return PatchSafety::reject("no file paths found in patch");
    }

    for path in &paths {
        let p = Path::new(path);
        if path.starts_with('/') || p.is_absolute() {
            return PatchSafety::reject(format!("absolute path in patch: {}", path));
        }
        if p.components().any(|c| matches!(c, Component::ParentDir)) {
            return PatchSafety::reject(format!("parent path in patch: {}", path));
        }
        let allowed = p
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| allowed_files.contains(&name))
            .unwrap_or(false);
        if !allowed {
            return PatchSafety::reject(format!("patch touches disallowed file: {}", path));
        }
    }

    PatchSafety::safe()
}

/// Added plus removed lines, excluding file headers.
pub fn edit_lines(patch: &str) -> usize {
    patch
        .lines()
        .filter(|line| !line.starts_with("+++") && !line.starts_with("---"))
        .filter(|line| line.starts_with('+') || line.starts_with('-'))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> [&'static str; 2] {
        ["impl.py", "tests.py"]
    }

    const GOOD: &str = "--- a/impl.py\t2024-01-01 00:00:00\n+++ b/impl.py\n@@ -1,2 +1,2 @@\n-def f():\n+def g():\n     return 1\n--- /dev/null\n+++ b/tests.py\n@@ -0,0 +1 @@\n+import impl\n";

    #[test]
    fn test_extract_patch_paths() {
        assert_eq!(
            extract_patch_paths(GOOD),
            vec!["impl.py", "impl.py", "tests.py"]
        );
        assert_eq!(extract_patch_paths("--- a/b/x.py\n"), vec!["b/x.py"]);
    }

    #[test]
    fn test_allowed_files_pass() {
        let verdict = check_patch_safety(GOOD, &allowed());
        assert!(verdict.safe);
        assert!(verdict.reason.is_empty());
    }

    #[test]
    fn test_rejection_reasons() {
        let cases = [
            ("", "empty patch"),
            ("  \n\t\n", "empty patch"),
            ("@@ -1 +1 @@\n-a\n+b\n", "no file paths found in patch"),
            ("--- /etc/passwd\n+++ /etc/passwd\n", "absolute path in patch: /etc/passwd"),
            ("--- a/../secret.py\n+++ b/../secret.py\n", "parent path in patch: ../secret.py"),
            ("--- a/setup.py\n+++ b/setup.py\n", "patch touches disallowed file: setup.py"),
            ("--- a/impl.py\n+++ b/conftest.py\n", "patch touches disallowed file: conftest.py"),
        ];
        for (patch, reason) in cases {
            let verdict = check_patch_safety(patch, &allowed());
            assert!(!verdict.safe, "patch should be unsafe: {patch:?}");
            assert_eq!(verdict.reason, reason);
        }
    }

    #[test]
    fn test_parent_component_only() {
        let verdict = check_patch_safety("--- a/x..y/impl.py\n+++ b/x..y/impl.py\n", &allowed());
        assert!(verdict.safe);
    }

    #[test]
    fn test_edit_lines() {
        assert_eq!(edit_lines(GOOD), 3);
        assert_eq!(edit_lines(""), 0);
    }
}
