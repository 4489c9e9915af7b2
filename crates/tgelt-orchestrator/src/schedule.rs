//! Cron trigger for the pipeline job
//!
//! An apalis worker consumes a cron stream; every tick runs the job once.
//! There are no in-process retries: a failed run is logged and the next tick
//! starts from scratch.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::{normalize_cron, parse_schedule, OrchestratorConfig};
use crate::error::{OrchestratorError, Result};
use crate::job::{telegram_pipeline_job, JobDefinition};
use crate::runner::run_job;

/// Name of the default schedule.
pub const DAILY_SCHEDULE_NAME: &str = "daily_telegram_pipeline_schedule";

#[derive(Debug, Clone)]
pub struct ScheduleDefinition {
    pub name: String,
    pub description: String,
    pub job: JobDefinition,
    /// Seconds-first cron expression, evaluated in UTC
    pub cron: String,
}

impl ScheduleDefinition {
    /// Validate the job graph and normalize the cron expression.
    pub fn new(name: &str, description: &str, job: JobDefinition, cron: &str) -> Result<Self> {
        job.validate()?;
        let cron = normalize_cron(cron)?;

        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            job,
            cron,
        })
    }

    pub fn schedule(&self) -> Result<Schedule> {
        parse_schedule(&self.cron)
    }

    /// Next `count` fire times after now
    pub fn upcoming(&self, count: usize) -> Result<Vec<DateTime<Utc>>> {
        Ok(self.schedule()?.upcoming(Utc).take(count).collect())
    }
}

/// Runs the full pipeline daily; midnight UTC unless `PIPELINE_SCHEDULE`
/// says otherwise.
pub fn daily_telegram_pipeline_schedule(config: &OrchestratorConfig) -> Result<ScheduleDefinition> {
    ScheduleDefinition::new(
        DAILY_SCHEDULE_NAME,
        "Runs the full Telegram data pipeline daily",
        telegram_pipeline_job(config),
        &config.schedule,
    )
}

/// One cron tick
#[derive(Debug, Clone, Default)]
pub struct PipelineTick {
    pub fired_at: Option<DateTime<Utc>>,
}

impl From<DateTime<Utc>> for PipelineTick {
    fn from(fired_at: DateTime<Utc>) -> Self {
        Self {
            fired_at: Some(fired_at),
        }
    }
}

async fn handle_tick(tick: PipelineTick, job: Data<JobDefinition>) {
    info!(fired_at = ?tick.fired_at, job = %job.name, "Schedule fired");

    match run_job(&job).await {
        Ok(report) if report.succeeded() => {
            info!(run_id = %report.run_id, "Scheduled run succeeded");
        },
        Ok(report) => {
            let (op, reason) = report.failure().unwrap_or_default();
            error!(run_id = %report.run_id, op, reason, "Scheduled run failed");
        },
        Err(e) => error!(error = %e, "Scheduled run could not start"),
    }
}

/// Run the schedule until Ctrl-C.
pub async fn run_schedule(definition: ScheduleDefinition) -> Result<()> {
    let schedule = definition.schedule()?;
    if let Some(next) = schedule.upcoming(Utc).next() {
        info!(
            schedule = %definition.name,
            cron = %definition.cron,
            next_run = %next,
            "Starting scheduler"
        );
    }

    let worker = WorkerBuilder::new(definition.name.as_str())
        .data(definition.job)
        .backend(CronStream::new(schedule))
        .build_fn(handle_tick);

    Monitor::new()
        .register(worker)
        .run_with_signal(tokio::signal::ctrl_c())
        .await
        .map_err(|e| OrchestratorError::Scheduler(e.to_string()))?;

    info!("Scheduler stopped");
    Ok(())
}
