use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::services::JwtKeys;
use crate::config::AppConfig;
use crate::detections::repo::{DetectionStore, PgDetectionStore};
use crate::storage::{LocalUploads, UploadStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub detections: Arc<dyn DetectionStore>,
    pub uploads: Arc<dyn UploadStore>,
}

impl AppState {
    /// Connects to Postgres, applies migrations and wires the stores.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("migrations applied");

        let uploads = Arc::new(LocalUploads::new(config.upload_dir.clone())) as Arc<dyn UploadStore>;

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgDetectionStore::new(db)),
            uploads,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        detections: Arc<dyn DetectionStore>,
        uploads: Arc<dyn UploadStore>,
    ) -> Self {
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users,
            detections,
            uploads,
        }
    }
}
