//! Architectural Enforcement
//!
//! Source scanners shared by the enforcement tests in `tests/`:
//! - No direct sleep calls outside the clock abstraction
//! - All I/O in async paths goes through tokio
//! - Credential state lives in broker instances, never in globals
//!
//! Scanning is line based. Comments and `#[cfg(test)]` modules are ignored.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace-relative directory of the core crate's sources
pub const CORE_SRC: &str = "conductor/core/src";

/// Workspace-relative directory of the CLI's sources
pub const CLI_SRC: &str = "conductor/cli/src";

/// A rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Resolve a workspace-relative directory
pub fn workspace_dir(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// All `.rs` files under `dir`
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Non-test code lines of a file as `(line_number, code)`
///
/// Everything from the first `#[cfg(test)]` on is dropped, matching the
/// layout where test modules close out a file.
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if code.trim().is_empty() {
            continue;
        }
        lines.push((idx + 1, code));
    }
    lines
}

/// Scan every production line under `dir` with `is_violation`
///
/// `skip` filters out files exempt from the rule.
pub fn scan<F, S>(dir: &Path, skip: S, is_violation: F) -> Vec<Violation>
where
    F: Fn(&str) -> bool,
    S: Fn(&Path) -> bool,
{
    let mut violations = Vec::new();
    for path in rust_files(dir) {
        if skip(&path) {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for (line, code) in production_lines(&content) {
            if is_violation(code) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    text: code.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Print and fail on any violation
pub fn report(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\nFound {} violation(s) of: {rule}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let src = "fn a() {}\n// note\nfn b() {} // trailing\n#[cfg(test)]\nmod tests { fn c() {} }\n";
        let lines = production_lines(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (1, "fn a() {}"));
        assert_eq!(lines[1].0, 3);
        assert_eq!(lines[1].1.trim(), "fn b() {}");
    }

    #[test]
    fn test_workspace_dir_finds_core() {
        assert!(workspace_dir(CORE_SRC).join("lib.rs").exists());
    }
}
