use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{sort_newest_first, Article};

use super::write_json_atomic;

/// One JSON file per article plus the legacy `articles.json` list.
pub struct ArticleStore {
    dir: PathBuf,
    legacy_file: PathBuf,
}

impl ArticleStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join("articles"),
            legacy_file: cache_dir.join("articles.json"),
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn article_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("article_{}.json", id))
    }

    pub async fn save(&self, article: &Article) -> Result<()> {
        write_json_atomic(&self.article_path(article.id), article).await
    }

    /// Reads a single article file. A missing file is `Ok(None)`.
    pub async fn load(&self, id: u64) -> Result<Option<Article>> {
        let bytes = match tokio::fs::read(self.article_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Loads every readable article. Broken files are skipped. When the
    /// per-article directory has nothing to offer, the legacy list seeds the
    /// result and is written back out as individual files.
    pub async fn load_all(&self) -> Result<Vec<Article>> {
        let articles = self.scan_dir().await?;
        if !articles.is_empty() {
            tracing::info!(count = articles.len(), "Loaded articles from individual files");
            return Ok(articles);
        }

        let articles = self.load_legacy_list().await;
        if articles.is_empty() {
            return Ok(articles);
        }

        self.ensure_dirs().await?;
        for article in &articles {
            if let Err(e) = self.save(article).await {
                tracing::warn!(id = article.id, error = %e, "Failed to materialize legacy article");
            }
        }
        tracing::info!(count = articles.len(), "Loaded articles from legacy cache file");
        Ok(articles)
    }

    pub async fn save_legacy_list(&self, articles: &[Article]) -> Result<()> {
        let mut articles = articles.to_vec();
        sort_newest_first(&mut articles);
        write_json_atomic(&self.legacy_file, &articles).await
    }

    async fn scan_dir(&self) -> Result<Vec<Article>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut articles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_article(&path).await {
                Ok(article) => articles.push(article),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable article file");
                }
            }
        }
        Ok(articles)
    }

    async fn load_legacy_list(&self) -> Vec<Article> {
        let bytes = match tokio::fs::read(&self.legacy_file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(error = %e, "Failed to read legacy article list");
                }
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!(error = %e, "Legacy article list is not valid JSON");
                Vec::new()
            }
        }
    }
}

async fn read_article(path: &Path) -> Result<Article> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
