use plate_monitor::{app, auth::services::ensure_admin, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "plate_monitor=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let admin = config.admin.clone();
    let app_state = AppState::init(config).await?;

    if let Some(seed) = admin {
        ensure_admin(app_state.users.as_ref(), &seed.username, &seed.password).await?;
    }

    tracing::info!(upload_dir = %app_state.config.upload_dir.display(), "serving uploads");
    app::serve(app::build_app(app_state)).await
}
