use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};

use super::{
    dto::{DetectionFilter, PageRequest},
    repo_types::{Detection, NewDetection},
};

#[async_trait]
pub trait DetectionStore: Send + Sync {
    async fn insert(&self, new: NewDetection) -> anyhow::Result<Detection>;

    async fn count(&self, filter: &DetectionFilter) -> anyhow::Result<i64>;

    /// Matching rows, newest first. `page = None` returns every match.
    async fn list(
        &self,
        filter: &DetectionFilter,
        page: Option<PageRequest>,
    ) -> anyhow::Result<Vec<Detection>>;
}

/// `ILIKE` pattern matching `needle` literally anywhere in the column.
pub fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[derive(Clone)]
pub struct PgDetectionStore {
    db: PgPool,
}

impl PgDetectionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DetectionStore for PgDetectionStore {
    async fn insert(&self, new: NewDetection) -> anyhow::Result<Detection> {
        let row = sqlx::query_as::<_, Detection>(
            r#"
            INSERT INTO detections (plate_number, image_url, source, metadata, detected_at)
            VALUES ($1, $2, $3, $4, COALESCE($5::timestamptz, now()))
            RETURNING id, plate_number, image_url, source, detected_at, metadata
            "#,
        )
        .bind(&new.plate_number)
        .bind(&new.image_url)
        .bind(new.source)
        .bind(Json(&new.metadata))
        .bind(new.detected_at)
        .fetch_one(&self.db)
        .await
        .context("insert detection")?;
        Ok(row)
    }

    async fn count(&self, filter: &DetectionFilter) -> anyhow::Result<i64> {
        let (n,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
              FROM detections
             WHERE ($1::text IS NULL OR plate_number ILIKE $1 ESCAPE '\')
               AND ($2::timestamptz IS NULL OR detected_at >= $2)
               AND ($3::timestamptz IS NULL OR detected_at <= $3)
            "#,
        )
        .bind(filter.plate_number.as_deref().map(contains_pattern))
        .bind(filter.start)
        .bind(filter.end)
        .fetch_one(&self.db)
        .await
        .context("count detections")?;
        Ok(n)
    }

    async fn list(
        &self,
        filter: &DetectionFilter,
        page: Option<PageRequest>,
    ) -> anyhow::Result<Vec<Detection>> {
        // LIMIT NULL means no limit in Postgres.
        let (limit, offset) = match page {
            Some(p) => (Some(p.limit), p.offset()),
            None => (None, 0),
        };
        let rows = sqlx::query_as::<_, Detection>(
            r#"
            SELECT id, plate_number, image_url, source, detected_at, metadata
              FROM detections
             WHERE ($1::text IS NULL OR plate_number ILIKE $1 ESCAPE '\')
               AND ($2::timestamptz IS NULL OR detected_at >= $2)
               AND ($3::timestamptz IS NULL OR detected_at <= $3)
             ORDER BY detected_at DESC, id DESC
             LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.plate_number.as_deref().map(contains_pattern))
        .bind(filter.start)
        .bind(filter.end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list detections")?;
        Ok(rows)
    }
}
