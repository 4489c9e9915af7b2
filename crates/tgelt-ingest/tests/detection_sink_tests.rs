//! Detection persistence tests against a real PostgreSQL

mod common;

use anyhow::Result;
use common::{init_tracing, TestPostgres};
use serial_test::serial;
use sqlx::types::Json;
use tgelt_ingest::enricher::{BoundingBox, Detection, DetectionSink, PgDetectionSink};

fn detection(class_name: &str, confidence: f32) -> Detection {
    Detection {
        class_name: class_name.to_string(),
        confidence,
        bbox: BoundingBox {
            x1: 12.5,
            y1: 40.0,
            x2: 220.0,
            y2: 310.75,
        },
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_records_one_row_per_detection() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let sink = PgDetectionSink::new(pg.config.clone());

    let written = sink
        .record(5021, &[detection("bottle", 0.91), detection("person", 0.47)])
        .await?;
    assert_eq!(written, 2);

    let mut conn = pg.connect().await?;
    let rows: Vec<(i64, String, f32, Json<BoundingBox>)> = sqlx::query_as(
        "SELECT message_id, detected_object_class, confidence_score, bounding_box \
         FROM marts.fct_image_detections ORDER BY confidence_score DESC",
    )
    .fetch_all(&mut conn)
    .await?;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, 5021);
    assert_eq!(rows[0].1, "bottle");
    assert_eq!(rows[0].2, 0.91);
    assert_eq!(rows[0].3 .0, detection("bottle", 0.91).bbox);
    assert_eq!(rows[1].1, "person");

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_reruns_duplicate_rows() -> Result<()> {
    init_tracing();
    let pg = TestPostgres::start().await?;
    let sink = PgDetectionSink::new(pg.config.clone());

    sink.record(77, &[detection("cup", 0.6)]).await?;
    sink.record(77, &[detection("cup", 0.6)]).await?;
    assert_eq!(sink.record(78, &[]).await?, 0);

    assert_eq!(
        pg.count("SELECT COUNT(*) FROM marts.fct_image_detections WHERE message_id = 77").await?,
        2
    );
    assert_eq!(pg.count("SELECT COUNT(*) FROM marts.fct_image_detections").await?, 2);

    Ok(())
}
