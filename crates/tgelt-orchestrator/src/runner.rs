//! Op and job execution
//!
//! Every op runs as a child process with both output streams captured. When
//! an op fails, every op downstream of it is reported as skipped; ops on
//! other branches still run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::job::{JobDefinition, OpDefinition};

/// Captured output of a successful op
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run one op to completion.
pub async fn run_op(op: &OpDefinition) -> Result<OpOutput> {
    info!(op = %op.name, command = %op.command, "Executing op");

    let output = Command::new(&op.command.program)
        .args(&op.command.args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| OrchestratorError::Spawn {
            op: op.name.clone(),
            program: op.command.program.display().to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(OrchestratorError::OpFailed {
            op: op.name.clone(),
            status: output.status,
            stderr: stderr.trim().to_string(),
        });
    }

    if !stdout.trim().is_empty() {
        info!(op = %op.name, "output:\n{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        warn!(op = %op.name, "stderr:\n{}", stderr.trim_end());
    }
    info!(op = %op.name, "Op completed");

    Ok(OpOutput { stdout, stderr })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpOutcome {
    Succeeded { duration_ms: u64 },
    Failed { duration_ms: u64, error: String },
    /// Not started because an upstream op failed or was skipped
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpReport {
    pub op: String,
    #[serde(flatten)]
    pub outcome: OpOutcome,
}

/// Record of one job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per op, in execution order
    pub ops: Vec<OpReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.ops
            .iter()
            .all(|report| matches!(report.outcome, OpOutcome::Succeeded { .. }))
    }

    /// The first op that failed, with its error message
    pub fn failure(&self) -> Option<(&str, &str)> {
        self.ops.iter().find_map(|report| match &report.outcome {
            OpOutcome::Failed { error, .. } => Some((report.op.as_str(), error.as_str())),
            _ => None,
        })
    }

    /// `Ok` when every op succeeded, else the failing op's error message
    pub fn into_result(self) -> std::result::Result<RunReport, String> {
        if let Some((_, error)) = self.failure() {
            return Err(error.to_string());
        }
        Ok(self)
    }
}

/// Run a job's ops in dependency order.
///
/// An op is skipped when its upstream op failed or was itself skipped.
/// Fails only when the job definition itself is invalid; op failures are
/// recorded in the returned report.
pub async fn run_job(job: &JobDefinition) -> Result<RunReport> {
    let order = job.execution_order()?;
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    info!(%run_id, job = %job.name, ops = order.len(), "Starting job run");

    let mut ops = Vec::with_capacity(order.len());
    // Failed or skipped ops; anything depending on them cannot start
    let mut blocked: HashSet<&str> = HashSet::new();

    for op in order {
        if op.depends_on.as_deref().is_some_and(|upstream| blocked.contains(upstream)) {
            blocked.insert(op.name.as_str());
            ops.push(OpReport {
                op: op.name.clone(),
                outcome: OpOutcome::Skipped,
            });
            continue;
        }

        let start = Instant::now();
        let result = run_op(op).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match result {
            Ok(_) => OpOutcome::Succeeded { duration_ms },
            Err(e) => {
                error!(%run_id, op = %op.name, error = %e, "Op failed; skipping downstream ops");
                blocked.insert(op.name.as_str());
                OpOutcome::Failed {
                    duration_ms,
                    error: e.to_string(),
                }
            },
        };
        ops.push(OpReport {
            op: op.name.clone(),
            outcome,
        });
    }

    let report = RunReport {
        run_id,
        job: job.name.clone(),
        started_at,
        finished_at: Utc::now(),
        ops,
    };

    let succeeded = report.ops.iter().filter(|r| matches!(r.outcome, OpOutcome::Succeeded { .. })).count();
    if report.succeeded() {
        info!(%run_id, job = %job.name, succeeded, "Job run succeeded");
    } else {
        error!(
            %run_id,
            job = %job.name,
            succeeded,
            failed_op = report.failure().map(|(op, _)| op).unwrap_or_default(),
            "Job run failed"
        );
    }

    Ok(report)
}
