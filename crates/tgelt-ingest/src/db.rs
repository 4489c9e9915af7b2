//! PostgreSQL connection settings and target schemas
//!
//! Stages open one connection per unit of work (a JSON file, an image) and
//! close it when done; there is no pool.

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Duration;
use tgelt_common::env;

use crate::error::Result;

/// Default database host.
pub const DEFAULT_POSTGRES_HOST: &str = "localhost";

/// Default database port.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Database connection settings
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    /// Load from `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_DB`,
    /// `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            host: env::string_or("POSTGRES_HOST", DEFAULT_POSTGRES_HOST),
            port: env::parse_or("POSTGRES_PORT", DEFAULT_POSTGRES_PORT)?,
            database: env::required("POSTGRES_DB")?,
            user: env::required("POSTGRES_USER")?,
            password: env::var("POSTGRES_PASSWORD").unwrap_or_default(),
            connect_timeout_secs: env::parse_or(
                "POSTGRES_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(tgelt_common::PipelineError::Config(
                "POSTGRES_PORT must be greater than 0".to_string(),
            )
            .into());
        }
        if self.connect_timeout_secs == 0 {
            return Err(tgelt_common::PipelineError::Config(
                "POSTGRES_CONNECT_TIMEOUT_SECS must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }

    /// Open a fresh connection for one unit of work.
    pub async fn connect(&self) -> Result<PgConnection> {
        let options = self.connect_options();
        let connect = PgConnection::connect_with(&options);
        let conn = tokio::time::timeout(Duration::from_secs(self.connect_timeout_secs), connect)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}:{}", self.host, self.port),
                )
            })??;

        tracing::debug!(host = %self.host, database = %self.database, "Database connection opened");
        Ok(conn)
    }
}

// ============================================================================
// Schemas
// ============================================================================

const CREATE_RAW_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS raw";

const CREATE_RAW_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS raw.telegram_messages (
    id BIGINT PRIMARY KEY,
    channel_id BIGINT,
    message_data JSONB,
    scraped_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)
"#;

const CREATE_MARTS_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS marts";

const CREATE_IMAGE_DETECTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS marts.fct_image_detections (
    detection_id SERIAL PRIMARY KEY,
    message_id BIGINT NOT NULL,
    detected_object_class TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    bounding_box JSONB,
    detected_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Ensure `raw.telegram_messages` exists.
pub async fn ensure_raw_schema(conn: &mut PgConnection) -> Result<()> {
    sqlx::query(CREATE_RAW_SCHEMA).execute(&mut *conn).await?;
    sqlx::query(CREATE_RAW_MESSAGES).execute(&mut *conn).await?;
    tracing::debug!("Raw table 'raw.telegram_messages' ensured");
    Ok(())
}

/// Ensure `marts.fct_image_detections` exists.
pub async fn ensure_detection_schema(conn: &mut PgConnection) -> Result<()> {
    sqlx::query(CREATE_MARTS_SCHEMA).execute(&mut *conn).await?;
    sqlx::query(CREATE_IMAGE_DETECTIONS).execute(&mut *conn).await?;
    tracing::debug!("Fact table 'marts.fct_image_detections' ensured");
    Ok(())
}
