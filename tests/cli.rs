use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn axiom(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("axiom").unwrap();
    cmd.current_dir(dir.path()).env_remove("GEMINI_API_KEY");
    cmd
}

#[test]
fn schema_prints_config_schema() {
    let dir = TempDir::new().unwrap();
    axiom(&dir)
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"concurrency\""))
        .stdout(predicate::str::contains("\"stages\""));
}

#[test]
fn dry_run_prints_plan_without_calls() {
    let dir = TempDir::new().unwrap();
    axiom(&dir)
        .args(["run", "Are heat pumps viable in cold climates?", "--dry-run"])
        .args(["--context", "Focus on Scandinavia", "--concurrency", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Execution Plan ==="))
        .stdout(predicate::str::contains(
            "Question: Are heat pumps viable in cold climates?",
        ))
        .stdout(predicate::str::contains("Context: Focus on Scandinavia"))
        .stdout(predicate::str::contains("Concurrency: 5"));

    assert!(!dir.path().join("reports").exists());
}

#[test]
fn dry_run_reads_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("custom.yaml"),
        "provider: claude_cli\nconcurrency: 2\n",
    )
    .unwrap();

    axiom(&dir)
        .args(["run", "Q", "--dry-run", "--config", "custom.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider: claude_cli"))
        .stdout(predicate::str::contains("Concurrency: 2"));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    axiom(&dir)
        .args(["run", "Q", "--dry-run", "--config", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("axiom.yaml"), "concurrency: 0\n").unwrap();

    axiom(&dir)
        .args(["run", "Q", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn empty_question_rejected() {
    let dir = TempDir::new().unwrap();
    axiom(&dir)
        .args(["run", "   ", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must not be empty"));
}

#[test]
fn resume_requires_readable_checkpoint() {
    let dir = TempDir::new().unwrap();
    axiom(&dir)
        .args(["resume", "runs/0xFFFF.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read checkpoint"));
}
