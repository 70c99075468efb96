//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code never sleeps directly. Waiting between polls
//! goes through the injected `Clock`, so tests drive time with `ManualClock`.
//! **Exception**: `clock.rs`, which owns the real sleep.

use std::path::Path;

use architectural_enforcement::{report, scan, workspace_dir, CLI_SRC, CORE_SRC};

fn is_direct_sleep(code: &str) -> bool {
    code.contains("thread::sleep(") || code.contains("time::sleep(") || code.contains("sleep_until(")
}

fn is_clock_module(path: &Path) -> bool {
    path.ends_with("clock.rs")
}

#[test]
fn test_no_direct_sleep_in_core() {
    let violations = scan(&workspace_dir(CORE_SRC), is_clock_module, is_direct_sleep);
    report("direct sleep outside the clock abstraction", &violations);
}

#[test]
fn test_no_direct_sleep_in_cli() {
    let violations = scan(&workspace_dir(CLI_SRC), |_| false, is_direct_sleep);
    report("direct sleep in the CLI", &violations);
}

#[test]
fn test_clock_module_is_the_sleeper() {
    let violations = scan(
        &workspace_dir(CORE_SRC),
        |path| !is_clock_module(path),
        is_direct_sleep,
    );
    assert!(
        !violations.is_empty(),
        "clock.rs should hold the only real sleep"
    );
}
