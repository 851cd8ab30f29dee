use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest},
        extractors::AuthUser,
        services::{compare_password, hash_password, MIN_PASSWORD_LEN},
    },
    error::{ApiError, ApiResult},
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

#[instrument(skip(state, payload), fields(caller = %caller.username))]
pub async fn register(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    let (Some(username), Some(password)) =
        (required(payload.username), required(payload.password))
    else {
        return Err(ApiError::validation("Username and password are required"));
    };
    let username = username.trim().to_string();

    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let hash = hash_password(&password)?;
    let Some(user) = state.users.create(&username, &hash).await? else {
        warn!(username = %username, "username already registered");
        return Err(ApiError::Conflict("Username already exists".into()));
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (Some(username), Some(password)) =
        (required(payload.username), required(payload.password))
    else {
        return Err(ApiError::validation("Username and password are required"));
    };
    let username = username.trim();

    let Some(user) = state.users.find_by_username(username).await? else {
        warn!(username = %username, "login unknown user");
        return Err(ApiError::Unauthorized);
    };

    if !compare_password(&password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized);
    }

    let token = state.jwt.issue_token(user.id, &user.username)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful".into(),
        token,
        user: PublicUser {
            id: user.id,
            username: user.username,
        },
    }))
}
