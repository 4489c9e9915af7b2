//! TGELT Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and environment configuration for the
//! Telegram ELT pipeline.
//!
//! # Overview
//!
//! - **Error Handling**: [`PipelineError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Environment**: `.env` loading and typed variable lookups
//!
//! # Example
//!
//! ```no_run
//! use tgelt_common::env;
//! use tgelt_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     env::load_dotenv();
//!     init_logging(&LogConfig::from_env()?)?;
//!
//!     let page_size: u32 = env::parse_or("TELEGRAM_PAGE_SIZE", 100)?;
//!     tracing::info!(page_size, "configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{PipelineError, Result};
