//! Metadata published alongside every raster.

use aqi_common::BoundingBox;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Describes one published raster so consumers can place it on a map and
/// judge its staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMetadata {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub bbox: BoundingBox,
    pub width: usize,
    pub height: usize,
    pub observation_count: usize,
    pub field_min: Option<f64>,
    pub field_max: Option<f64>,
    pub field_mean: Option<f64>,
}

impl RasterMetadata {
    /// Key/value pairs written as PNG `tEXt` chunks.
    pub fn text_entries(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("Software".to_string(), "aqi-publisher".to_string()),
            ("cycle_id".to_string(), self.cycle_id.to_string()),
            (
                "generated_at".to_string(),
                self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("bbox".to_string(), self.bbox.to_string()),
            ("dimensions".to_string(), format!("{}x{}", self.width, self.height)),
            ("observations".to_string(), self.observation_count.to_string()),
        ];
        let stats = [
            ("field_min", self.field_min),
            ("field_max", self.field_max),
            ("field_mean", self.field_mean),
        ];
        for (key, value) in stats {
            if let Some(v) = value {
                entries.push((key.to_string(), format!("{:.3}", v)));
            }
        }
        entries
    }
}

/// A PNG-encoded raster ready to publish.
#[derive(Debug, Clone)]
pub struct EncodedRaster {
    pub png: Bytes,
    pub metadata: RasterMetadata,
}
