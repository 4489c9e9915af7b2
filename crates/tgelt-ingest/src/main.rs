//! TGELT Ingest - pipeline stage runner

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tgelt_common::env;
use tgelt_common::logging::{init_logging, LogConfig};
use tgelt_ingest::db::PostgresConfig;
use tgelt_ingest::enricher::DetectorConfig;
use tgelt_ingest::lake::{DataLake, DEFAULT_LAKE_ROOT};
use tgelt_ingest::transformer::{self, TransformConfig};
use tgelt_ingest::{env_check, loader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tgelt-ingest")]
#[command(author, version, about = "Telegram ELT pipeline stages")]
struct Cli {
    #[command(subcommand)]
    stage: Stage,

    /// Root of the raw data lake
    #[arg(long, global = true, env = "DATA_LAKE_ROOT", default_value = DEFAULT_LAKE_ROOT)]
    lake_root: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Stage {
    /// Scrape channel history and photos into the data lake
    Scrape {
        /// Channel link or username; repeat for several (default: TELEGRAM_CHANNELS)
        #[arg(short, long = "channel")]
        channels: Vec<String>,

        /// Partition date (default: today, local time)
        #[arg(long)]
        date: Option<String>,

        /// Photos downloaded per channel
        #[arg(long)]
        max_images: Option<usize>,
    },

    /// Load data lake JSON files into raw.telegram_messages
    Load,

    /// Run dbt over the warehouse
    Transform {
        /// dbt project directory
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },

    /// Detect objects in downloaded photos
    Enrich {
        /// YOLOv8 ONNX model
        #[arg(long)]
        model: Option<PathBuf>,

        /// Minimum detection confidence
        #[arg(long)]
        confidence: Option<f32>,
    },

    /// Report which pipeline variables are set
    CheckEnv,
}

#[tokio::main]
async fn main() -> Result<()> {
    env::load_dotenv();
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("tgelt-ingest")
        .build()
        .merge_env()?
        .verbose(cli.verbose);

    let _guard = init_logging(&log_config)?;

    let lake = DataLake::new(&cli.lake_root);

    match cli.stage {
        Stage::Scrape {
            channels,
            date,
            max_images,
        } => scrape(&lake, channels, date, max_images).await?,
        Stage::Load => {
            let config = PostgresConfig::from_env()?;
            let summary = loader::load_lake(&config, &lake).await;
            if summary.files_failed > 0 {
                if summary.files_loaded == 0 {
                    bail!("all {} data lake files failed to load", summary.files_failed);
                }
                warn!(files_failed = summary.files_failed, "Some files were not loaded");
            }
        },
        Stage::Transform { project_dir } => {
            let mut config = TransformConfig::from_env();
            if let Some(dir) = project_dir {
                config.project_dir = dir;
            }
            transformer::run_transformations(&config).await?;
        },
        Stage::Enrich { model, confidence } => {
            let mut config = DetectorConfig::from_env()?;
            if let Some(model) = model {
                config.model_path = model;
            }
            if let Some(confidence) = confidence {
                config.confidence_threshold = confidence;
            }
            config.validate()?;
            enrich(config, &lake).await?;
        },
        Stage::CheckEnv => {
            let missing = env_check::report();
            if missing > 0 {
                bail!("{missing} required variable(s) not set");
            }
        },
    }

    info!("Stage complete");
    Ok(())
}

#[cfg(feature = "telegram")]
async fn scrape(
    lake: &DataLake,
    channels: Vec<String>,
    date: Option<String>,
    max_images: Option<usize>,
) -> Result<()> {
    use tgelt_ingest::collector::{self, MtprotoSource, TelegramConfig};

    let mut config = TelegramConfig::from_env()?;
    if !channels.is_empty() {
        config.channels = channels;
    }
    if let Some(max_images) = max_images {
        config.options.max_images = max_images;
    }

    let source = MtprotoSource::connect(&config).await?;
    let date = date.unwrap_or_else(collector::today);
    let summary = collector::collect(&source, &config.channels, lake, &date, &config.options).await;
    source.save_session()?;

    if summary.channels_scraped == 0 && summary.channels_failed > 0 {
        bail!("all {} channels failed to scrape", summary.channels_failed);
    }

    info!(
        channels_scraped = summary.channels_scraped,
        channels_failed = summary.channels_failed,
        messages = summary.messages_written,
        images = summary.images_downloaded,
        "Scraping complete"
    );
    Ok(())
}

#[cfg(not(feature = "telegram"))]
async fn scrape(
    _lake: &DataLake,
    _channels: Vec<String>,
    _date: Option<String>,
    _max_images: Option<usize>,
) -> Result<()> {
    // Credentials are still checked so a misconfigured host fails the same way
    tgelt_ingest::collector::TelegramConfig::from_env()?;
    bail!("tgelt-ingest was built without the `telegram` feature; rebuild with --features telegram")
}

#[cfg(feature = "onnx")]
async fn enrich(config: DetectorConfig, lake: &DataLake) -> Result<()> {
    use tgelt_ingest::enricher::{self, OnnxDetector, PgDetectionSink};

    let detector = OnnxDetector::load(config)?;
    let sink = PgDetectionSink::new(PostgresConfig::from_env()?);
    let summary = enricher::enrich_images(&detector, &sink, lake).await;
    if summary.images_failed > 0 {
        if summary.images_processed == 0 {
            bail!("all {} images failed to enrich", summary.images_failed);
        }
        warn!(images_failed = summary.images_failed, "Some images were not enriched");
    }
    Ok(())
}

#[cfg(not(feature = "onnx"))]
async fn enrich(_config: DetectorConfig, _lake: &DataLake) -> Result<()> {
    bail!("tgelt-ingest was built without the `onnx` feature")
}
