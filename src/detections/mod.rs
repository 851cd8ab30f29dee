use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod export;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(max_body_bytes: usize) -> Router<AppState> {
    handlers::detection_routes(max_body_bytes)
}
