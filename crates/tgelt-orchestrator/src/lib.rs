//! TGELT Orchestrator Library
//!
//! Defines the pipeline job graph, runs it once on demand, and triggers it
//! on a cron schedule.
//!
//! # Example
//!
//! ```no_run
//! use tgelt_orchestrator::config::OrchestratorConfig;
//! use tgelt_orchestrator::job::telegram_pipeline_job;
//! use tgelt_orchestrator::runner::run_job;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let job = telegram_pipeline_job(&OrchestratorConfig::from_env()?);
//!     let report = run_job(&job).await?;
//!     println!("run {} succeeded: {}", report.run_id, report.succeeded());
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod job;
pub mod runner;
pub mod schedule;

pub use error::{OrchestratorError, Result};
