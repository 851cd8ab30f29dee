use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// URL prefix under which uploaded files are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Writes `body` as `file_name` and returns the public relative URL.
    async fn put_object(&self, file_name: &str, body: Bytes) -> anyhow::Result<String>;
}

/// Uploads kept on local disk and served statically.
#[derive(Clone, Debug)]
pub struct LocalUploads {
    dir: PathBuf,
}

impl LocalUploads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl UploadStore for LocalUploads {
    async fn put_object(&self, file_name: &str, body: Bytes) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create upload dir {}", self.dir.display()))?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        debug!(path = %path.display(), bytes = body.len(), "upload written");
        Ok(format!("{}/{}", UPLOADS_ROUTE, file_name))
    }
}
