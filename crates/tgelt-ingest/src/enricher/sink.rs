//! Detection persistence

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::Connection;

use super::detection::Detection;
use crate::db::{ensure_detection_schema, PostgresConfig};
use crate::error::Result;

const INSERT_DETECTION: &str = r#"
INSERT INTO marts.fct_image_detections (
    message_id, detected_object_class, confidence_score, bounding_box
) VALUES ($1, $2, $3, $4)
"#;

/// Destination for the detections of one image
#[async_trait]
pub trait DetectionSink: Send + Sync {
    /// Persist all detections of one image atomically; returns rows written.
    async fn record(&self, message_id: i64, detections: &[Detection]) -> Result<u64>;
}

/// Writes to `marts.fct_image_detections`, one connection per image
pub struct PgDetectionSink {
    config: PostgresConfig,
}

impl PgDetectionSink {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DetectionSink for PgDetectionSink {
    async fn record(&self, message_id: i64, detections: &[Detection]) -> Result<u64> {
        let mut conn = self.config.connect().await?;
        ensure_detection_schema(&mut conn).await?;

        let mut tx = conn.begin().await?;
        let mut inserted = 0;
        for detection in detections {
            inserted += sqlx::query(INSERT_DETECTION)
                .bind(message_id)
                .bind(&detection.class_name)
                .bind(detection.confidence)
                .bind(Json(detection.bbox))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        conn.close().await?;

        Ok(inserted)
    }
}
