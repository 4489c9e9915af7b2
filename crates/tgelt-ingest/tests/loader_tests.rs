//! Raw loader tests against a real PostgreSQL
//!
//! Covers idempotent re-loads, per-file transactions and the channel id
//! extraction rules.

mod common;

use anyhow::Result;
use common::{init_tracing, TestPostgres};
use serde_json::{json, Value};
use serial_test::serial;
use std::path::Path;
use tgelt_ingest::lake::DataLake;
use tgelt_ingest::loader::{load_file, load_lake, LoadSummary};

fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn channel_message(id: i64, text: &str) -> Value {
    json!({
        "_": "Message",
        "id": id,
        "peer_id": { "_": "PeerChannel", "channel_id": 1_427_693_241_i64 },
        "date": "2024-05-01T08:30:00+00:00",
        "message": text,
    })
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_load_lake_is_idempotent() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    let lake = DataLake::new(dir.path());

    write_json(
        &lake.messages_file("2024-05-01", "lobelia4cosmetics"),
        &json!([
            channel_message(101, "Vitamin C serum"),
            channel_message(102, "Sunscreen SPF 50"),
            { "_": "Message", "message": "no id" },
        ]),
    );
    write_json(
        &lake.messages_file("2024-05-01", "tikvahpharma"),
        &json!([{ "id": 7, "peer_id": { "_": "PeerUser", "user_id": 55 } }]),
    );

    let first = load_lake(&pg.config, &lake).await;
    assert_eq!(
        first,
        LoadSummary {
            files_loaded: 2,
            files_failed: 0,
            records_seen: 4,
            rows_inserted: 3,
            records_skipped: 1,
        }
    );

    let second = load_lake(&pg.config, &lake).await;
    assert_eq!(second.files_loaded, 2);
    assert_eq!(second.rows_inserted, 0);

    assert_eq!(pg.count("SELECT COUNT(*) FROM raw.telegram_messages").await?, 3);
    assert_eq!(
        pg.count("SELECT COUNT(*) FROM raw.telegram_messages WHERE channel_id = 1427693241").await?,
        2
    );
    assert_eq!(
        pg.count("SELECT COUNT(*) FROM raw.telegram_messages WHERE id = 7 AND channel_id IS NULL").await?,
        1
    );
    assert_eq!(
        pg.count(
            "SELECT COUNT(*) FROM raw.telegram_messages \
             WHERE message_data->>'message' = 'Sunscreen SPF 50' AND scraped_at IS NOT NULL"
        )
        .await?,
        1
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_failing_file_rolls_back_and_others_load() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    let lake = DataLake::new(dir.path());

    // JSONB rejects the NUL escape, failing the second insert of this file
    write_json(
        &lake.messages_file("2024-05-02", "aaa_channel"),
        &json!([channel_message(201, "fine"), channel_message(202, "bad \u{0000} byte")]),
    );
    let broken = lake.messages_file("2024-05-02", "bbb_channel");
    std::fs::create_dir_all(broken.parent().unwrap())?;
    std::fs::write(&broken, b"[{\"id\": 1")?;
    write_json(
        &lake.messages_file("2024-05-02", "ccc_channel"),
        &json!([channel_message(301, "still loaded")]),
    );

    let summary = load_lake(&pg.config, &lake).await;
    assert_eq!(summary.files_loaded, 1);
    assert_eq!(summary.files_failed, 2);
    assert_eq!(summary.rows_inserted, 1);

    assert_eq!(pg.count("SELECT COUNT(*) FROM raw.telegram_messages").await?, 1);
    assert_eq!(pg.count("SELECT COUNT(*) FROM raw.telegram_messages WHERE id = 201").await?, 0);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_load_file_creates_schema() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("single.json");
    write_json(&path, &json!([]));

    let stats = load_file(&pg.config, &path).await?;
    assert_eq!(stats.records, 0);
    assert_eq!(
        pg.count("SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'raw' AND table_name = 'telegram_messages'")
            .await?,
        1
    );

    Ok(())
}
