//! CLI integration tests
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("docify");
    cmd.env_remove("GEMINI_API_KEY").env_remove("BROWSERLESS_TOKEN").env_remove("RUST_LOG");
    cmd
}

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

#[test]
fn test_cli_help_lists_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("analyze"));
}

#[test]
fn test_cli_extract_html_file() {
    cmd()
        .args(["extract", &get_fixture_path("scheduler_guide.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Title: Getting Started with the Scheduler"))
        .stdout(predicate::str::contains("Kind: html"))
        .stdout(predicate::str::contains("passes the 0.70 gate"))
        .stdout(predicate::str::contains("priority queue"));
}

#[test]
fn test_cli_extract_strips_page_chrome() {
    cmd()
        .args(["extract", &get_fixture_path("scheduler_guide.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Release Notes").not())
        .stdout(predicate::str::contains("window.__docs").not());
}

#[test]
fn test_cli_extract_json_report() {
    let output = cmd()
        .args(["extract", "--json", &get_fixture_path("scheduler_guide.html")])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["kind"], "html");
    assert_eq!(report["fetch_method"], "file");
    assert!(report["word_count"].as_u64().unwrap() > 100);
    assert!(report["validation"]["confidence"].as_f64().unwrap() > 0.7);
    assert!(report["validation"]["issues"].as_array().unwrap().is_empty());
}

#[test]
fn test_cli_extract_markdown_file() {
    cmd()
        .args(["extract", &get_fixture_path("worker_pool.md")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Title: Worker Pool Reference"))
        .stdout(predicate::str::contains("Kind: markdown"));
}

#[test]
fn test_cli_extract_stdin() {
    let html = std::fs::read_to_string(get_fixture_path("scheduler_guide.html")).unwrap();
    cmd()
        .args(["extract", "-"])
        .write_stdin(html)
        .assert()
        .success()
        .stdout(predicate::str::contains("Getting Started with the Scheduler"));
}

#[test]
fn test_cli_extract_short_text_reports_issue() {
    cmd()
        .args(["extract", &get_fixture_path("short.txt")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Content too short"))
        .stderr(predicate::str::contains("quality gate"));
}

#[test]
fn test_cli_extract_strict_fails_gate() {
    cmd()
        .args(["extract", "--strict", &get_fixture_path("short.txt")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too short"));
}

#[test]
fn test_cli_extract_output_file() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("report.json");

    cmd()
        .args(["extract", "--json", "-o", output.to_str().unwrap()])
        .arg(get_fixture_path("scheduler_guide.html"))
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["title"], "Getting Started with the Scheduler");
}

#[test]
fn test_cli_extract_invalid_file() {
    cmd().args(["extract", "nonexistent.html"]).assert().failure();
}

#[test]
fn test_cli_extract_rejects_loopback_url() {
    cmd()
        .args(["extract", "http://127.0.0.1:9/admin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssrf_rejected"));
}

#[test]
fn test_cli_verbose() {
    cmd()
        .args(["-v", "extract", &get_fixture_path("scheduler_guide.html")])
        .assert()
        .success()
        .stderr(predicate::str::contains("Docify"))
        .stderr(predicate::str::contains("Timing Summary"));
}

#[test]
fn test_cli_analyze_requires_api_key() {
    cmd()
        .args(["analyze", "https://docs.example.com/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}

#[test]
fn test_cli_analyze_loopback_fails_without_network() {
    let tmp = TempDir::new().unwrap();
    let output = cmd()
        .args(["analyze", "http://localhost:8080/internal", "--api-key", "test-key", "--blob-dir"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("ssrf_rejected"))
        .get_output()
        .stdout
        .clone();

    let record: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(record["status"], "failed");
}
