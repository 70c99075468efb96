//! Integration Test: Async I/O and Scoped State
//!
//! **Policy**:
//! - Code reachable from a pipeline uses `tokio::fs` and async `reqwest`,
//!   never `std::fs` or `reqwest::blocking`
//! - Credentials are cached per `TokenBroker` instance; no process-wide
//!   statics hold tokens
//!
//! **Exception**: `config/`, which loads once before any pipeline runs.

use architectural_enforcement::{report, scan, workspace_dir, CORE_SRC};

fn is_blocking_io(code: &str) -> bool {
    code.contains("std::fs::")
        || code.contains("std::net::")
        || code.contains("reqwest::blocking")
        || code.contains("std::process::Command")
}

fn is_global_state(code: &str) -> bool {
    let code = code.trim_start();
    code.starts_with("static ")
        || code.starts_with("pub static ")
        || code.starts_with("pub(crate) static ")
        || code.contains("lazy_static!")
        || code.contains("OnceLock")
        || code.contains("OnceCell")
        || code.contains("thread_local!")
}

fn constructs_credential(code: &str) -> bool {
    code.match_indices("Credential {").any(|(idx, _)| {
        !code[..idx]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

#[test]
fn test_no_blocking_io_in_async_paths() {
    let violations = scan(
        &workspace_dir(CORE_SRC),
        |path| path.components().any(|c| c.as_os_str() == "config"),
        is_blocking_io,
    );
    report("blocking I/O in async code paths", &violations);
}

#[test]
fn test_no_global_credential_cache() {
    let violations = scan(&workspace_dir(CORE_SRC), |_| false, is_global_state);
    report("process-wide mutable state", &violations);
}

#[test]
fn test_credential_match_is_exact() {
    assert!(constructs_credential("let c = Credential { token };"));
    assert!(!constructs_credential("pub struct AcquireCredential {"));
}

#[test]
fn test_broker_is_the_only_token_cache() {
    let credentials = workspace_dir(CORE_SRC).join("credentials");
    assert!(
        credentials.join("mod.rs").exists(),
        "credentials module moved; update this test"
    );
    let caches = scan(
        &workspace_dir(CORE_SRC),
        |path| path.starts_with(&credentials),
        constructs_credential,
    );
    report("credentials constructed outside the broker", &caches);
}
