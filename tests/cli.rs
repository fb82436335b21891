//! CLI smoke tests. A full run needs live LLM/embedding endpoints, so these
//! exercise the paths that don't: help output and the dataset-not-found
//! error path, grounded in `tests/cli_integration.rs`'s `assert_cmd` +
//! `predicates` convention (here paired with `tempfile::TempDir` per
//! `codex-rs/cli/tests/mcp_list.rs` rather than manual temp-dir bookkeeping).

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn intent_cluster_cmd() -> Command {
    Command::cargo_bin("intent-cluster").unwrap()
}

#[test]
fn help_lists_expected_flags() {
    intent_cluster_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dataset"))
        .stdout(predicate::str::contains("--source-dir"))
        .stdout(predicate::str::contains("--cache-dir"));
}

#[test]
fn missing_dataset_source_file_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let source_dir = dir.path().join("data");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&source_dir).unwrap();

    intent_cluster_cmd()
        .args(["--dataset", "does-not-exist"])
        .arg("--source-dir")
        .arg(&source_dir)
        .arg("--cache-dir")
        .arg(&cache_dir)
        .arg("--config")
        .arg(dir.path().join("missing-config.toml"))
        .assert()
        .failure();
}
