//! Raw loader: data lake JSON -> `raw.telegram_messages`
//!
//! Each JSON file is loaded on its own connection inside its own
//! transaction. Inserts ignore primary-key conflicts, so loading the same
//! file twice is a no-op the second time.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::Connection;
use std::path::Path;
use tracing::{error, info, instrument, warn};

use crate::db::{ensure_raw_schema, PostgresConfig};
use crate::error::{IngestError, Result};
use crate::lake::{find_files, DataLake};

const INSERT_RAW_MESSAGE: &str = r#"
INSERT INTO raw.telegram_messages (id, channel_id, message_data)
VALUES ($1, $2, $3)
ON CONFLICT (id) DO NOTHING
"#;

/// Row of `raw.telegram_messages`, minus the defaulted `scraped_at`
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessageRow<'a> {
    pub id: i64,
    pub channel_id: Option<i64>,
    pub message_data: &'a Value,
}

impl<'a> RawMessageRow<'a> {
    /// Build a row from a scraped record.
    ///
    /// Returns `None` when the record has no integer `id`. The channel id is
    /// taken from `peer_id.channel_id` only for `PeerChannel` peers.
    pub fn from_record(record: &'a Value) -> Option<Self> {
        let id = record.get("id")?.as_i64()?;
        let channel_id = record
            .get("peer_id")
            .filter(|peer| peer.get("_").and_then(Value::as_str) == Some("PeerChannel"))
            .and_then(|peer| peer.get("channel_id"))
            .and_then(Value::as_i64);

        Some(Self {
            id,
            channel_id,
            message_data: record,
        })
    }
}

/// Counters for one loaded file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLoadStats {
    pub records: usize,
    pub inserted: u64,
    pub skipped: usize,
}

/// Counters for a whole loader run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files_loaded: usize,
    pub files_failed: usize,
    pub records_seen: usize,
    pub rows_inserted: u64,
    pub records_skipped: usize,
}

/// Parse a data lake file into its list of records.
pub fn read_records(path: &Path, contents: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(contents)? {
        Value::Array(records) => Ok(records),
        other => Err(IngestError::InvalidData {
            path: path.display().to_string(),
            reason: format!("expected a JSON array of messages, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Load one JSON file in a single transaction.
///
/// On any error the transaction is rolled back and the error returned; rows
/// committed by earlier files are unaffected.
#[instrument(skip(config), fields(file = %path.display()))]
pub async fn load_file(config: &PostgresConfig, path: &Path) -> Result<FileLoadStats> {
    let contents = tokio::fs::read_to_string(path).await?;
    let records = read_records(path, &contents)?;

    let mut conn = config.connect().await?;
    ensure_raw_schema(&mut conn).await?;

    let mut stats = FileLoadStats {
        records: records.len(),
        ..Default::default()
    };

    // Dropping the transaction without commit rolls it back
    let mut tx = conn.begin().await?;
    for record in &records {
        let Some(row) = RawMessageRow::from_record(record) else {
            warn!(record = %record, "Skipping message due to missing ID");
            stats.skipped += 1;
            continue;
        };

        let result = sqlx::query(INSERT_RAW_MESSAGE)
            .bind(row.id)
            .bind(row.channel_id)
            .bind(Json(row.message_data))
            .execute(&mut *tx)
            .await?;
        stats.inserted += result.rows_affected();
    }
    tx.commit().await?;
    conn.close().await?;

    info!(
        records = stats.records,
        inserted = stats.inserted,
        skipped = stats.skipped,
        "Loaded {} messages from {} into PostgreSQL",
        stats.records,
        path.display()
    );

    Ok(stats)
}

/// Load every JSON file under the lake's message tree.
///
/// A failing file is logged and counted; the loader moves on to the next.
pub async fn load_lake(config: &PostgresConfig, lake: &DataLake) -> LoadSummary {
    info!(root = %lake.messages_root().display(), "Starting raw data loading to PostgreSQL");

    let mut summary = LoadSummary::default();
    for path in find_files(&lake.messages_root(), "json") {
        match load_file(config, &path).await {
            Ok(stats) => {
                summary.files_loaded += 1;
                summary.records_seen += stats.records;
                summary.rows_inserted += stats.inserted;
                summary.records_skipped += stats.skipped;
            },
            Err(e) => {
                error!(file = %path.display(), error = %e, "Error loading file; transaction rolled back");
                summary.files_failed += 1;
            },
        }
    }

    info!(
        files_loaded = summary.files_loaded,
        files_failed = summary.files_failed,
        rows_inserted = summary.rows_inserted,
        "Raw data loading complete"
    );
    summary
}
