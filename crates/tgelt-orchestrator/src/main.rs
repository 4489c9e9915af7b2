//! TGELT Orchestrator - runs and schedules the pipeline job

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tgelt_common::env;
use tgelt_common::logging::{init_logging, LogConfig};
use tgelt_orchestrator::config::{normalize_cron, OrchestratorConfig};
use tgelt_orchestrator::runner::run_job;
use tgelt_orchestrator::schedule::{daily_telegram_pipeline_schedule, run_schedule};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tgelt-orchestrator")]
#[command(author, version, about = "Telegram ELT pipeline orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Stage runner executable (default: tgelt-ingest next to this binary)
    #[arg(long, global = true, env = "TGELT_INGEST_BIN")]
    ingest_bin: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline job once, now
    Run {
        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run the pipeline job on its cron schedule until interrupted
    Schedule {
        /// Cron expression, five or six fields, UTC
        #[arg(long, env = "PIPELINE_SCHEDULE")]
        cron: Option<String>,
    },

    /// Show the job graph and the next scheduled runs
    Describe {
        /// Number of upcoming fire times to show
        #[arg(long, default_value_t = 3)]
        upcoming: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::load_dotenv();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("tgelt-orchestrator")
        .build()
        .merge_env()?
        .verbose(cli.verbose);

    let _guard = init_logging(&log_config)?;

    let mut config = OrchestratorConfig::from_env()?;
    if let Some(bin) = cli.ingest_bin {
        config.ingest_bin = bin;
    }

    match cli.command {
        Command::Run { report: report_path } => {
            let definition = daily_telegram_pipeline_schedule(&config)?;
            let report = run_job(&definition.job).await?;

            if let Some(path) = report_path {
                std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;
                info!(path = %path.display(), "Run report written");
            }

            report.into_result().map_err(|e| anyhow!(e))?;
        },
        Command::Schedule { cron } => {
            if let Some(cron) = cron {
                config.schedule = normalize_cron(&cron)?;
            }
            let definition = daily_telegram_pipeline_schedule(&config)?;
            run_schedule(definition).await?;
        },
        Command::Describe { upcoming } => {
            let definition = daily_telegram_pipeline_schedule(&config)?;
            let job = &definition.job;

            info!(job = %job.name, "{}", job.description);
            for (index, op) in job.execution_order()?.into_iter().enumerate() {
                info!(
                    step = index + 1,
                    op = %op.name,
                    after = op.depends_on.as_deref().unwrap_or("-"),
                    command = %op.command,
                    "{}",
                    op.description
                );
            }

            info!(schedule = %definition.name, cron = %definition.cron, "{}", definition.description);
            for fire in definition.upcoming(upcoming)? {
                info!(next_run = %fire, "Upcoming run");
            }
        },
    }

    Ok(())
}
