use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Where a detection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "detection_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Camera,
    Manual,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Camera => "camera",
            DetectionSource::Manual => "manual",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied detection metadata (frame index, confidence, ...).
///
/// Always a JSON object; stored as-is and handed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub Map<String, Value>);

impl Metadata {
    /// Anything that is not a JSON object becomes empty metadata.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Metadata(map),
            _ => Metadata::default(),
        }
    }

    /// Lenient parse of metadata sent as text; malformed input becomes empty.
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(Self::from_value)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Detection row as stored and returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub id: Uuid,
    pub plate_number: String,
    pub image_url: Option<String>,
    pub source: DetectionSource,
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
    pub metadata: Json<Metadata>,
}

/// Validated detection ready for insertion.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub plate_number: String,
    pub image_url: Option<String>,
    pub source: DetectionSource,
    pub metadata: Metadata,
    /// Defaults to the insertion time.
    pub detected_at: Option<OffsetDateTime>,
}
