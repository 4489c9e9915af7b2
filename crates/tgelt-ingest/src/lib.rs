//! TGELT Ingest Library
//!
//! The four stages of the Telegram ELT pipeline, each runnable on its own
//! through the `tgelt-ingest` binary.
//!
//! # Stages
//!
//! - **collector**: Telegram channel history and photos into the data lake
//! - **loader**: data lake JSON into `raw.telegram_messages`
//! - **transformer**: `dbt build` over the warehouse
//! - **enricher**: YOLOv8 object detection into `marts.fct_image_detections`
//!
//! # Example
//!
//! ```no_run
//! use tgelt_ingest::db::PostgresConfig;
//! use tgelt_ingest::lake::DataLake;
//! use tgelt_ingest::loader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PostgresConfig::from_env()?;
//!     let summary = loader::load_lake(&config, &DataLake::from_env()).await;
//!     println!("{} rows inserted", summary.rows_inserted);
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod collector;
pub mod db;
pub mod enricher;
pub mod env_check;
pub mod error;
pub mod lake;
pub mod loader;
pub mod transformer;

pub use error::{IngestError, Result};
