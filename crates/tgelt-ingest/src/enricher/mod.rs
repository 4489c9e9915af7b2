// Image enrichment
//
// Runs object detection over every downloaded photo and stores one row per
// detected object in `marts.fct_image_detections`:
// - Photo file names are the owning message id (`<message_id>.jpg`)
// - Each image is detected and persisted independently
//
// Re-running inserts the detections again; rows are not deduplicated.

pub mod detection;
pub mod sink;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use detection::{BoundingBox, Detection, DetectorConfig};
pub use sink::{DetectionSink, PgDetectionSink};

#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

use std::path::Path;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::lake::{find_files, DataLake};

/// Finds objects in an image file
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, path: &Path) -> Result<Vec<Detection>>;
}

/// Counters for an enrichment run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub images_seen: usize,
    pub images_processed: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
    pub detections_recorded: u64,
}

/// Message id encoded in a photo's file name (`12345.jpg` -> 12345).
pub fn message_id_from_path(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Detect and record objects for every `*.jpg` under the lake's image tree.
pub async fn enrich_images(
    detector: &dyn ObjectDetector,
    sink: &dyn DetectionSink,
    lake: &DataLake,
) -> EnrichSummary {
    info!(root = %lake.images_root().display(), "Starting image enrichment");

    let mut summary = EnrichSummary::default();
    for path in find_files(&lake.images_root(), "jpg") {
        summary.images_seen += 1;

        let Some(message_id) = message_id_from_path(&path) else {
            warn!(image = %path.display(), "Could not extract message ID from filename");
            summary.images_skipped += 1;
            continue;
        };

        match enrich_image(detector, sink, &path, message_id).await {
            Ok(recorded) => {
                summary.images_processed += 1;
                summary.detections_recorded += recorded;
            },
            Err(e) => {
                error!(image = %path.display(), message_id, error = %e, "Error processing image");
                summary.images_failed += 1;
            },
        }
    }

    info!(
        images_seen = summary.images_seen,
        images_processed = summary.images_processed,
        images_skipped = summary.images_skipped,
        images_failed = summary.images_failed,
        detections_recorded = summary.detections_recorded,
        "Image enrichment complete"
    );
    summary
}

async fn enrich_image(
    detector: &dyn ObjectDetector,
    sink: &dyn DetectionSink,
    path: &Path,
    message_id: i64,
) -> Result<u64> {
    info!(image = %path.display(), message_id, "Processing image");
    let detections = detector.detect(path)?;
    let recorded = sink.record(message_id, &detections).await?;
    info!(message_id, detections = recorded, "Loaded detections");
    Ok(recorded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubDetector;

    impl ObjectDetector for StubDetector {
        fn detect(&self, path: &Path) -> Result<Vec<Detection>> {
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if name == "13" {
                return Err(IngestError::Detection("corrupt JPEG".to_string()));
            }
            let count = name.parse::<usize>().unwrap_or(0) % 3;
            Ok((0..count)
                .map(|i| Detection {
                    class_name: "bottle".to_string(),
                    confidence: 0.5 + i as f32 / 10.0,
                    bbox: BoundingBox {
                        x1: 0.0,
                        y1: 0.0,
                        x2: 10.0,
                        y2: 10.0,
                    },
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl DetectionSink for MemorySink {
        async fn record(&self, message_id: i64, detections: &[Detection]) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            rows.extend(detections.iter().map(|d| (message_id, d.class_name.clone())));
            Ok(detections.len() as u64)
        }
    }

    fn touch(lake: &DataLake, channel: &str, name: &str) {
        let dir = lake.images_dir("2024-05-01", channel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), b"jpeg").unwrap();
    }

    #[test]
    fn test_message_id_from_path() {
        assert_eq!(message_id_from_path(Path::new("a/b/12345.jpg")), Some(12345));
        assert_eq!(message_id_from_path(Path::new("cover.jpg")), None);
        assert_eq!(message_id_from_path(Path::new("12a.jpg")), None);
    }

    #[tokio::test]
    async fn test_enrich_skips_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let lake = DataLake::new(dir.path());
        touch(&lake, "lobelia4cosmetics", "11.jpg");
        touch(&lake, "lobelia4cosmetics", "13.jpg");
        touch(&lake, "lobelia4cosmetics", "logo.jpg");
        touch(&lake, "tikvahpharma", "20.jpg");
        touch(&lake, "tikvahpharma", "21.jpg");
        touch(&lake, "tikvahpharma", "notes.txt");

        let sink = MemorySink::default();
        let summary = enrich_images(&StubDetector, &sink, &lake).await;

        assert_eq!(
            summary,
            EnrichSummary {
                images_seen: 5,
                images_processed: 3,
                images_skipped: 1,
                images_failed: 1,
                detections_recorded: 4,
            }
        );

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.iter().filter(|(id, _)| *id == 11).count(), 2);
        assert_eq!(rows.iter().filter(|(id, _)| *id == 20).count(), 2);
        assert!(rows.iter().all(|(id, _)| *id != 13 && *id != 21));
    }

    #[tokio::test]
    async fn test_enrich_missing_images_root() {
        let dir = tempfile::tempdir().unwrap();
        let lake = DataLake::new(dir.path().join("absent"));
        let summary = enrich_images(&StubDetector, &MemorySink::default(), &lake).await;
        assert_eq!(summary, EnrichSummary::default());
    }
}
