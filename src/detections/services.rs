use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{
    dto::{ImagePayload, IngestRequest},
    repo_types::{Detection, DetectionSource, NewDetection},
};
use crate::{error::ApiError, state::AppState};

// Padding is optional, as with most camera-side encoders.
const LENIENT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Strips an optional `data:image/<kind>;base64,` prefix and decodes the rest.
pub fn decode_base64_image(raw: &str) -> Option<Vec<u8>> {
    lazy_static! {
        static ref DATA_URL_RE: Regex = Regex::new(r"^data:image/\w+;base64,").unwrap();
    }
    let payload = DATA_URL_RE.replace(raw.trim(), "");
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    LENIENT_B64.decode(compact.as_bytes()).ok()
}

/// Final path component of a client-supplied name.
fn base_name(name: &str) -> &str {
    let name = name.rsplit(['/', '\\']).next().unwrap_or("");
    match name {
        "" | "." | ".." => "upload",
        n => n,
    }
}

fn epoch_millis(now: OffsetDateTime) -> i128 {
    now.unix_timestamp_nanos() / 1_000_000
}

/// `<epoch-millis>-<original-name>` for file parts, `<epoch-millis>.jpg` for base64.
pub fn upload_file_name(now: OffsetDateTime, original: Option<&str>) -> String {
    let millis = epoch_millis(now);
    match original {
        Some(name) => format!("{}-{}", millis, base_name(name)),
        None => format!("{}.jpg", millis),
    }
}

/// Validates a canonical ingestion request, stores its image and inserts the row.
pub async fn ingest_detection(st: &AppState, req: IngestRequest) -> Result<Detection, ApiError> {
    let plate_number = req
        .plate_number
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::validation("Plate number is required"))?;

    let upload = match req.image {
        None => None,
        Some(ImagePayload::File(file)) => {
            let name = upload_file_name(
                OffsetDateTime::now_utc(),
                Some(file.file_name.as_deref().unwrap_or("upload")),
            );
            Some((name, file.body))
        }
        Some(ImagePayload::Base64(b64)) => {
            let bytes = decode_base64_image(&b64).ok_or_else(|| {
                warn!("invalid base64 image");
                ApiError::validation("Invalid base64 image")
            })?;
            Some((upload_file_name(OffsetDateTime::now_utc(), None), Bytes::from(bytes)))
        }
    };

    let image_url = match upload {
        Some((name, body)) => Some(st.uploads.put_object(&name, body).await?),
        None => None,
    };

    let detection = st
        .detections
        .insert(NewDetection {
            plate_number,
            image_url,
            source: DetectionSource::Camera,
            metadata: req.metadata,
            detected_at: None,
        })
        .await?;

    info!(
        detection_id = %detection.id,
        plate = %detection.plate_number,
        has_image = detection.image_url.is_some(),
        "detection stored"
    );
    Ok(detection)
}
