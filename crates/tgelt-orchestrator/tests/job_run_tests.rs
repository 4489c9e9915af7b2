//! Job execution against real child processes
//!
//! Ops are small `sh` scripts that leave marker files behind, so the tests
//! can check what ran, in which order, and what never started. Tests are
//! serial: a script written while another test forks can fail to exec with
//! ETXTBSY.

#![cfg(unix)]

use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tgelt_orchestrator::config::OrchestratorConfig;
use tgelt_orchestrator::job::{telegram_pipeline_job, JobDefinition, OpCommand, OpDefinition};
use tgelt_orchestrator::runner::{run_job, run_op, OpOutcome};
use tgelt_orchestrator::OrchestratorError;

fn sh(name: &str, script: String) -> OpDefinition {
    OpDefinition::new(name, "", OpCommand::new("sh", ["-c".to_string(), script]))
}

fn job(ops: Vec<OpDefinition>) -> JobDefinition {
    JobDefinition {
        name: "test_pipeline".to_string(),
        description: String::new(),
        ops,
    }
}

fn statuses(outcomes: &[OpOutcome]) -> Vec<&'static str> {
    outcomes
        .iter()
        .map(|outcome| match outcome {
            OpOutcome::Succeeded { .. } => "succeeded",
            OpOutcome::Failed { .. } => "failed",
            OpOutcome::Skipped => "skipped",
        })
        .collect()
}

/// A stand-in for the stage runner that appends its first argument to a log
fn fake_ingest_bin(dir: &Path, log: &Path, failing_stage: Option<&str>) -> PathBuf {
    let fail = failing_stage
        .map(|stage| format!("if [ \"$1\" = \"{stage}\" ]; then echo \"stage $1 exploded\" >&2; exit 1; fi\n"))
        .unwrap_or_default();
    let script = format!("#!/bin/sh\n{fail}echo \"$1\" >> {}\necho \"ran $1\"\n", log.display());

    let path = dir.join("tgelt-ingest");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
#[serial]
async fn test_ops_run_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");

    let job = job(vec![
        sh("second", format!("echo second >> {}", log.display())).after("first"),
        sh("first", format!("echo first >> {}", log.display())),
        sh("third", format!("echo third >> {}", log.display())).after("second"),
    ]);

    let report = run_job(&job).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.job, "test_pipeline");
    assert!(report.finished_at >= report.started_at);

    let ops: Vec<&str> = report.ops.iter().map(|r| r.op.as_str()).collect();
    assert_eq!(ops, vec!["first", "second", "third"]);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "first\nsecond\nthird\n");
}

#[tokio::test]
#[serial]
async fn test_failure_stops_downstream_ops() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("downstream-ran");

    let job = job(vec![
        sh("scrape", "echo scraped".to_string()),
        sh("load", "echo 'connection refused' >&2; exit 3".to_string()).after("scrape"),
        sh("transform", format!("touch {}", marker.display())).after("load"),
    ]);

    let report = run_job(&job).await.unwrap();
    let outcomes: Vec<OpOutcome> = report.ops.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(statuses(&outcomes), vec!["succeeded", "failed", "skipped"]);

    let (op, error) = report.failure().unwrap();
    assert_eq!(op, "load");
    assert!(error.contains("connection refused"));
    assert!(!marker.exists());
    assert!(report.into_result().is_err());
}

#[tokio::test]
#[serial]
async fn test_failure_only_skips_its_own_branch() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked-ran");
    let independent = dir.path().join("independent-ran");

    let job = job(vec![
        sh("scrape", "echo 'FLOOD_WAIT' >&2; exit 1".to_string()),
        sh("load", format!("touch {}", blocked.display())).after("scrape"),
        sh("transform", format!("touch {}", blocked.display())).after("load"),
        sh("enrich", format!("touch {}", independent.display())),
    ]);

    let report = run_job(&job).await.unwrap();
    let outcomes: Vec<OpOutcome> = report.ops.iter().map(|r| r.outcome.clone()).collect();
    let ops: Vec<&str> = report.ops.iter().map(|r| r.op.as_str()).collect();
    assert_eq!(ops, vec!["scrape", "enrich", "load", "transform"]);
    assert_eq!(statuses(&outcomes), vec!["failed", "succeeded", "skipped", "skipped"]);

    assert!(independent.exists());
    assert!(!blocked.exists());
    assert!(!report.succeeded());
    assert_eq!(report.failure().map(|(op, _)| op), Some("scrape"));
}

#[tokio::test]
#[serial]
async fn test_run_op_error_carries_stderr() {
    let op = sh("run_dbt_transformations", "echo 'Database Error in model dim_channels' >&2; exit 2".to_string());

    let err = run_op(&op).await.unwrap_err();
    match &err {
        OrchestratorError::OpFailed { op, status, stderr } => {
            assert_eq!(op, "run_dbt_transformations");
            assert_eq!(status.code(), Some(2));
            assert_eq!(stderr, "Database Error in model dim_channels");
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("Database Error in model dim_channels"));
}

#[tokio::test]
#[serial]
async fn test_run_op_captures_output() {
    let output = run_op(&sh("echo", "echo hello; echo warning >&2".to_string())).await.unwrap();
    assert_eq!(output.stdout, "hello\n");
    assert_eq!(output.stderr, "warning\n");
}

#[tokio::test]
#[serial]
async fn test_pipeline_job_invokes_each_stage() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stages.log");
    let config = OrchestratorConfig {
        ingest_bin: fake_ingest_bin(dir.path(), &log, None),
        schedule: "0 0 0 * * *".to_string(),
    };

    let report = run_job(&telegram_pipeline_job(&config)).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "scrape\nload\ntransform\nenrich\n");
}

#[tokio::test]
#[serial]
async fn test_pipeline_job_stops_at_failing_stage() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stages.log");
    let config = OrchestratorConfig {
        ingest_bin: fake_ingest_bin(dir.path(), &log, Some("transform")),
        schedule: "0 0 0 * * *".to_string(),
    };

    let report = run_job(&telegram_pipeline_job(&config)).await.unwrap();
    let outcomes: Vec<OpOutcome> = report.ops.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(statuses(&outcomes), vec!["succeeded", "succeeded", "failed", "skipped"]);

    let (op, error) = report.failure().unwrap();
    assert_eq!(op, "run_dbt_transformations");
    assert!(error.contains("stage transform exploded"));
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "scrape\nload\n");
}
