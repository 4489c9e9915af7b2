//! Shared helpers for database-backed ingest tests
//!
//! Each test starts its own PostgreSQL container through testcontainers, so
//! these tests need a local Docker daemon and are `#[ignore]`d by default:
//!
//! ```text
//! cargo test -p tgelt-ingest -- --ignored
//! ```

#![allow(dead_code)]

use anyhow::Result;
use sqlx::{Connection, PgConnection};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tgelt_ingest::db::PostgresConfig;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tgelt_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A throwaway PostgreSQL server; dropped with the test
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pub config: PostgresConfig,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default().with_tag("16-alpine").start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432).await?;

        let config = PostgresConfig {
            host: host.to_string(),
            port,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            connect_timeout_secs: 30,
        };

        Ok(Self {
            _container: container,
            config,
        })
    }

    pub async fn connect(&self) -> Result<PgConnection> {
        Ok(PgConnection::connect_with(&self.config.connect_options()).await?)
    }

    pub async fn count(&self, sql: &str) -> Result<i64> {
        let mut conn = self.connect().await?;
        let count: i64 = sqlx::query_scalar(sql).fetch_one(&mut conn).await?;
        Ok(count)
    }
}
