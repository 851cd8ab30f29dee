use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::debug;

use super::repo_types::{Detection, Metadata};
use crate::{error::ApiError, extract::ApiJson};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;

/// Raw query string of the list and export endpoints.
///
/// Kept as strings so bad values become a uniform validation error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub plate_number: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Filters shared by the list and export endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFilter {
    /// Case-insensitive substring of the plate.
    pub plate_number: Option<String>,
    /// Inclusive lower bound on `detected_at`.
    pub start: Option<OffsetDateTime>,
    /// Inclusive upper bound on `detected_at`.
    pub end: Option<OffsetDateTime>,
}

/// 1-based page request. `limit` has no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        total / self.limit + i64::from(total % self.limit != 0)
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (UTC midnight).
pub fn parse_date_bound(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

fn parse_positive(name: &str, raw: Option<&str>, default: i64) -> Result<i64, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ApiError::validation(format!(
            "{} must be a positive integer",
            name
        ))),
    }
}

impl ListParams {
    pub fn filter(&self) -> Result<DetectionFilter, ApiError> {
        let bound = |name: &str, raw: &Option<String>| -> Result<_, ApiError> {
            non_empty(raw)
                .map(|s| {
                    parse_date_bound(s)
                        .ok_or_else(|| ApiError::validation(format!("Invalid {}", name)))
                })
                .transpose()
        };
        Ok(DetectionFilter {
            plate_number: non_empty(&self.plate_number).map(str::to_string),
            start: bound("startDate", &self.start_date)?,
            end: bound("endDate", &self.end_date)?,
        })
    }

    pub fn page(&self) -> Result<PageRequest, ApiError> {
        Ok(PageRequest {
            page: parse_positive("page", non_empty(&self.page), DEFAULT_PAGE)?,
            limit: parse_positive("limit", non_empty(&self.limit), DEFAULT_LIMIT)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetectionPage {
    pub detections: Vec<Detection>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedDetectionResponse {
    pub message: String,
    pub detection: Detection,
}

/// JSON ingestion body as sent by the recognition process.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonIngest {
    #[serde(default)]
    pub plate_number: Option<Value>,
    /// Base64 image, optionally with a `data:image/...;base64,` prefix.
    #[serde(default)]
    pub image: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// File part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub body: Bytes,
}

/// Multipart ingestion body with text fields already collected.
#[derive(Debug, Default)]
pub struct MultipartIngest {
    pub plate_number: Option<String>,
    pub image: Option<UploadedFile>,
    pub metadata: Option<String>,
}

/// Ingestion body in either of the accepted encodings.
#[derive(Debug)]
pub enum IngestBody {
    Json(JsonIngest),
    Multipart(MultipartIngest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    File(UploadedFile),
    Base64(String),
}

/// Canonical ingestion request, independent of the wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub plate_number: Option<String>,
    pub image: Option<ImagePayload>,
    pub metadata: Metadata,
}

impl From<IngestBody> for IngestRequest {
    fn from(body: IngestBody) -> Self {
        match body {
            IngestBody::Json(j) => IngestRequest {
                plate_number: j.plate_number.and_then(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                }),
                image: match j.image {
                    Some(Value::String(s)) if !s.trim().is_empty() => {
                        Some(ImagePayload::Base64(s))
                    }
                    _ => None,
                },
                metadata: j.metadata.map(Metadata::from_value).unwrap_or_default(),
            },
            IngestBody::Multipart(m) => IngestRequest {
                plate_number: m.plate_number,
                image: m
                    .image
                    .filter(|f| !f.body.is_empty())
                    .map(ImagePayload::File),
                metadata: m
                    .metadata
                    .as_deref()
                    .map(Metadata::parse_lenient)
                    .unwrap_or_default(),
            },
        }
    }
}

async fn read_multipart(mut mp: Multipart) -> Result<MultipartIngest, ApiError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        debug!(error = %e, "multipart read failed");
        ApiError::validation("Invalid multipart body")
    };
    let mut out = MultipartIngest::default();
    while let Some(field) = mp.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("plateNumber") => out.plate_number = Some(field.text().await.map_err(invalid)?),
            Some("metadata") => out.metadata = Some(field.text().await.map_err(invalid)?),
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let body = field.bytes().await.map_err(invalid)?;
                out.image = Some(UploadedFile { file_name, body });
            }
            _ => {}
        }
    }
    Ok(out)
}

#[async_trait]
impl<S> FromRequest<S> for IngestBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let mp = Multipart::from_request(req, state)
                .await
                .map_err(|_| ApiError::validation("Invalid multipart body"))?;
            Ok(IngestBody::Multipart(read_multipart(mp).await?))
        } else {
            let ApiJson(body) = ApiJson::<JsonIngest>::from_request(req, state).await?;
            Ok(IngestBody::Json(body))
        }
    }
}
