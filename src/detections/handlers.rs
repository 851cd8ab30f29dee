use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{
    dto::{CreatedDetectionResponse, DetectionPage, IngestBody, ListParams, Pagination},
    export::{export_file_name, render_csv},
    services::ingest_detection,
};
use crate::{auth::extractors::AuthUser, error::ApiResult, extract::ApiQuery, state::AppState};

pub fn detection_routes(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/detections", get(list_detections).post(create_detection))
        .route("/detections/export", get(export_detections))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// POST /detections (JSON or multipart)
#[instrument(skip(state, body), fields(caller = %caller.username))]
pub async fn create_detection(
    State(state): State<AppState>,
    caller: AuthUser,
    body: IngestBody,
) -> ApiResult<(StatusCode, Json<CreatedDetectionResponse>)> {
    let detection = ingest_detection(&state, body.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedDetectionResponse {
            message: "Detection saved successfully".into(),
            detection,
        }),
    ))
}

/// GET /detections?plateNumber&startDate&endDate&page&limit
#[instrument(skip(state))]
pub async fn list_detections(
    State(state): State<AppState>,
    _caller: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<DetectionPage>> {
    let filter = params.filter()?;
    let page = params.page()?;

    let (detections, total) = tokio::try_join!(
        state.detections.list(&filter, Some(page)),
        state.detections.count(&filter),
    )?;

    Ok(Json(DetectionPage {
        detections,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: page.total_pages(total),
        },
    }))
}

/// GET /detections/export: every match as a CSV attachment.
#[instrument(skip(state))]
pub async fn export_detections(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = params.filter()?;
    let rows = state.detections.list(&filter, None).await?;
    let csv = render_csv(&rows);

    info!(user_id = %caller.id, rows = rows.len(), "detections exported");
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(OffsetDateTime::now_utc())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detections::repo_types::{Detection, DetectionSource, Metadata, NewDetection},
        error::ApiError,
        test_support::{fake_state, seed_detection},
    };
    use time::{macros::datetime, Duration};
    use uuid::Uuid;

    fn caller() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            username: "viewer".into(),
        }
    }

    fn query(pairs: &[(&str, &str)]) -> ApiQuery<ListParams> {
        let qs = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let uri: axum::http::Uri = format!("/api/detections?{}", qs).parse().unwrap();
        ApiQuery(axum::extract::Query::try_from_uri(&uri).unwrap().0)
    }

    async fn seed_many(state: &AppState, n: i64) {
        let base = datetime!(2024-03-01 12:00 UTC);
        for i in 0..n {
            // Inserted out of order on purpose.
            let at = base + Duration::minutes((i * 7) % n);
            seed_detection(state, &format!("PL-{:03}", i), at).await;
        }
    }

    async fn list(state: &AppState, pairs: &[(&str, &str)]) -> ApiResult<DetectionPage> {
        list_detections(State(state.clone()), caller(), query(pairs))
            .await
            .map(|Json(p)| p)
    }

    fn assert_newest_first(rows: &[Detection]) {
        for w in rows.windows(2) {
            assert!(w[0].detected_at >= w[1].detected_at);
        }
    }

    #[tokio::test]
    async fn unfiltered_list_is_newest_first() {
        let state = fake_state();
        seed_many(&state, 13).await;
        let page = list(&state, &[("limit", "100")]).await.unwrap();
        assert_eq!(page.detections.len(), 13);
        assert_newest_first(&page.detections);
        assert_eq!(
            page.pagination,
            Pagination {
                page: 1,
                limit: 100,
                total: 13,
                total_pages: 1
            }
        );
    }

    #[tokio::test]
    async fn pages_are_windows_over_the_ordered_set() {
        let state = fake_state();
        seed_many(&state, 23).await;
        let all = list(&state, &[("limit", "1000")]).await.unwrap().detections;

        for limit in [1usize, 4, 5, 20, 23, 30] {
            for page in 1..=7usize {
                let got = list(
                    &state,
                    &[
                        ("page", page.to_string().as_str()),
                        ("limit", limit.to_string().as_str()),
                    ],
                )
                .await
                .unwrap();
                let start = ((page - 1) * limit).min(all.len());
                let end = (page * limit).min(all.len());
                assert_eq!(got.detections, all[start..end].to_vec());
                assert_eq!(got.pagination.total, 23);
                assert_eq!(
                    got.pagination.total_pages,
                    (23 + limit as i64 - 1) / limit as i64
                );
            }
        }
    }

    #[tokio::test]
    async fn defaults_to_first_page_of_twenty() {
        let state = fake_state();
        seed_many(&state, 25).await;
        let page = list(&state, &[]).await.unwrap();
        assert_eq!(page.detections.len(), 20);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, 20);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[tokio::test]
    async fn plate_filter_is_case_insensitive_substring() {
        let state = fake_state();
        seed_detection(&state, "BA-1234", datetime!(2024-01-01 10:00 UTC)).await;
        seed_detection(&state, "XY-999", datetime!(2024-01-01 11:00 UTC)).await;
        seed_detection(&state, "ba-1 7", datetime!(2024-01-01 12:00 UTC)).await;

        let page = list(&state, &[("plateNumber", "ba-1")]).await.unwrap();
        let plates: Vec<_> = page.detections.iter().map(|d| d.plate_number.as_str()).collect();
        assert_eq!(plates, vec!["ba-1 7", "BA-1234"]);
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn date_bounds_are_inclusive() {
        let state = fake_state();
        for day in 1..=5 {
            let at = datetime!(2024-02-01 0:00 UTC) + Duration::days(day - 1);
            seed_detection(&state, &format!("D-{}", day), at).await;
        }
        let page = list(
            &state,
            &[("startDate", "2024-02-02"), ("endDate", "2024-02-04")],
        )
        .await
        .unwrap();
        let plates: Vec<_> = page.detections.iter().map(|d| d.plate_number.as_str()).collect();
        assert_eq!(plates, vec!["D-4", "D-3", "D-2"]);
    }

    #[tokio::test]
    async fn bad_query_values_are_validation_errors() {
        let state = fake_state();
        assert!(matches!(
            list(&state, &[("page", "0")]).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            list(&state, &[("endDate", "soon")]).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn export_returns_csv_attachment() {
        let state = fake_state();
        seed_detection(&state, "BA-1234", datetime!(2024-01-05 15:07 UTC)).await;
        state
            .detections
            .insert(NewDetection {
                plate_number: "XY-999".into(),
                image_url: Some("/uploads/1.jpg".into()),
                source: DetectionSource::Manual,
                metadata: Metadata::default(),
                detected_at: None,
            })
            .await
            .unwrap();

        let res = export_detections(State(state.clone()), caller(), query(&[("plateNumber", "ba")]))
            .await
            .unwrap()
            .into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/csv");
        let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"detections-"));

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            r#""1","BA-1234","Jan 5, 2024, 03:07 PM","camera","N/A""#
        );
    }
}
