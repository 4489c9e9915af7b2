//! Job graph definitions
//!
//! A job is a set of ops, each one external command. Dependencies carry no
//! data: an op starts only after the op it depends on has succeeded.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};

/// Name of the end-to-end pipeline job.
pub const PIPELINE_JOB_NAME: &str = "full_data_pipeline";

/// Program and arguments of an op
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl OpCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for OpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpDefinition {
    pub name: String,
    pub description: String,
    pub command: OpCommand,
    /// Op that must succeed first
    pub depends_on: Option<String>,
}

impl OpDefinition {
    pub fn new(name: &str, description: &str, command: OpCommand) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            command,
            depends_on: None,
        }
    }

    pub fn after(mut self, upstream: &str) -> Self {
        self.depends_on = Some(upstream.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDefinition {
    pub name: String,
    pub description: String,
    pub ops: Vec<OpDefinition>,
}

impl JobDefinition {
    /// Reject empty jobs, duplicate op names, unknown dependencies and cycles.
    pub fn validate(&self) -> Result<()> {
        self.execution_order().map(|_| ())
    }

    /// Ops in an order that respects every dependency.
    ///
    /// Ops that are free to run at the same time keep their declaration
    /// order.
    pub fn execution_order(&self) -> Result<Vec<&OpDefinition>> {
        if self.ops.is_empty() {
            return Err(OrchestratorError::invalid_job(&self.name, "job has no ops"));
        }

        let mut seen = HashSet::new();
        for op in &self.ops {
            if !seen.insert(op.name.as_str()) {
                return Err(OrchestratorError::invalid_job(
                    &self.name,
                    format!("duplicate op name '{}'", op.name),
                ));
            }
        }

        let mut downstream: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut ready = VecDeque::new();
        for (index, op) in self.ops.iter().enumerate() {
            match op.depends_on.as_deref() {
                Some(upstream) if !seen.contains(upstream) => {
                    return Err(OrchestratorError::invalid_job(
                        &self.name,
                        format!("op '{}' depends on unknown op '{upstream}'", op.name),
                    ));
                },
                Some(upstream) => downstream.entry(upstream).or_default().push(index),
                None => ready.push_back(index),
            }
        }

        let mut order = Vec::with_capacity(self.ops.len());
        while let Some(index) = ready.pop_front() {
            let op = &self.ops[index];
            order.push(op);
            if let Some(children) = downstream.get(op.name.as_str()) {
                ready.extend(children.iter().copied());
            }
        }

        if order.len() != self.ops.len() {
            return Err(OrchestratorError::invalid_job(&self.name, "op dependencies form a cycle"));
        }
        Ok(order)
    }
}

fn ingest_op(ingest_bin: &Path, name: &str, stage: &str, description: &str) -> OpDefinition {
    OpDefinition::new(name, description, OpCommand::new(ingest_bin, [stage]))
}

/// Scrape, load, transform, enrich; each stage waits for the previous one.
pub fn telegram_pipeline_job(config: &OrchestratorConfig) -> JobDefinition {
    let bin = config.ingest_bin.as_path();

    JobDefinition {
        name: PIPELINE_JOB_NAME.to_string(),
        description: "Runs the end-to-end Telegram data pipeline".to_string(),
        ops: vec![
            ingest_op(bin, "scrape_telegram_data", "scrape", "Scrape Telegram channels into the data lake"),
            ingest_op(bin, "load_raw_to_postgres", "load", "Load raw JSON from the data lake into PostgreSQL")
                .after("scrape_telegram_data"),
            ingest_op(bin, "run_dbt_transformations", "transform", "Run dbt models and tests")
                .after("load_raw_to_postgres"),
            ingest_op(bin, "run_yolo_enrichment", "enrich", "Run YOLOv8 object detection over downloaded images")
                .after("run_dbt_transformations"),
        ],
    }
}
