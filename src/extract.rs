//! Body and query extractors whose rejections render as [`ApiError`].

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// JSON body, parsed whatever the declared content type.
#[derive(Debug, Clone, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let raw = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::validation("Unreadable request body"))?;
        serde_json::from_slice(&raw).map(ApiJson).map_err(|e| {
            debug!(error = %e, "json body rejected");
            ApiError::validation("Invalid JSON body")
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::try_from_uri(&parts.uri).map_err(|e| {
            debug!(error = %e, "query string rejected");
            ApiError::validation("Invalid query string")
        })?;
        Ok(ApiQuery(value))
    }
}
