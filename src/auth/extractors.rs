use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::services::JwtKeys;
use crate::error::ApiError;

/// Authenticated caller resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        match keys.authenticate(&parts.headers) {
            Some(claims) => Ok(AuthUser {
                id: claims.sub,
                username: claims.username,
            }),
            None => {
                warn!(uri = %parts.uri, "unauthenticated request");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
