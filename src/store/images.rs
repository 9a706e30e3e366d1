use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::feed::HttpFetcher;

use super::write_atomic;

pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";
const IMAGE_URL_PREFIX: &str = "/images";

/// Featured images keyed by article id. Bytes are stored as fetched.
pub struct ImageStore {
    dir: PathBuf,
    fetcher: HttpFetcher,
}

impl ImageStore {
    pub fn new(cache_dir: &Path, fetcher: HttpFetcher) -> Self {
        Self {
            dir: cache_dir.join("images"),
            fetcher,
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn file_name(id: u64) -> String {
        format!("image_{}.jpg", id)
    }

    /// URL path clients use to request the cached image.
    pub fn public_path(id: u64) -> String {
        format!("{}/{}", IMAGE_URL_PREFIX, Self::file_name(id))
    }

    pub async fn exists(&self, id: u64) -> bool {
        tokio::fs::try_exists(self.dir.join(Self::file_name(id)))
            .await
            .unwrap_or(false)
    }

    pub async fn download(&self, id: u64, url: &str) -> Result<()> {
        let response = self.fetcher.get(url).await?;
        write_atomic(&self.dir.join(Self::file_name(id)), &response.body).await?;
        tracing::debug!(id, status = response.status, bytes = response.body.len(), "Cached featured image");
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        if !is_plain_file_name(name) {
            return Err(not_found());
        }
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Bild nicht gefunden".to_string())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}
