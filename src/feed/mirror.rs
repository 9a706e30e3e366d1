use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{AppError, Result};
use crate::models::{sort_newest_first, Article, ServerStatus};
use crate::store::{ArticleStore, ImageStore, StatusStore};

use super::fetcher::HttpFetcher;
use super::wordpress;

type Index = Arc<HashMap<u64, Article>>;

/// Local mirror of the school's WordPress news feed.
///
/// Readers always work on an immutable snapshot of the index. A refresh
/// builds a complete replacement and swaps it in at the end, so a reader
/// sees either the old set or the new one and never a mix.
pub struct NewsMirror {
    source_url: String,
    ttl: Duration,
    fetcher: HttpFetcher,
    articles: ArticleStore,
    images: ImageStore,
    status: StatusStore,
    index: Mutex<Index>,
    last_refresh: Mutex<Option<Instant>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl NewsMirror {
    pub async fn open(
        source_url: String,
        ttl: Duration,
        fetcher: HttpFetcher,
        cache_dir: &Path,
    ) -> Result<Self> {
        let articles = ArticleStore::new(cache_dir);
        articles.ensure_dirs().await?;
        let images = ImageStore::new(cache_dir, fetcher.clone());
        images.ensure_dirs().await?;
        let status = StatusStore::open(cache_dir).await;

        let mirror = Self {
            source_url,
            ttl,
            fetcher,
            articles,
            images,
            status,
            index: Mutex::new(Arc::new(HashMap::new())),
            last_refresh: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        };
        mirror.load_from_disk().await?;
        Ok(mirror)
    }

    /// Rebuilds the in-memory index from the per-article cache files.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let loaded = self.articles.load_all().await?;
        let index: HashMap<u64, Article> = loaded.into_iter().map(|a| (a.id, a)).collect();
        let count = index.len();
        self.swap_index(Arc::new(index));
        tracing::info!(count, "Loaded cached articles");
        Ok(count)
    }

    /// All cached articles, newest first. Refreshes first when the cache is
    /// empty or stale; a failed refresh falls back to whatever is cached.
    pub async fn list_articles(&self) -> Result<Vec<Article>> {
        if self.needs_refresh() {
            if let Err(e) = self.refresh_if_stale().await {
                if self.snapshot().is_empty() {
                    return match e {
                        AppError::UpstreamEmpty => Ok(Vec::new()),
                        e => Err(e),
                    };
                }
                tracing::warn!(error = %e, "Refresh failed, serving cached articles");
            }
        }

        let mut articles: Vec<Article> = self.snapshot().values().cloned().collect();
        sort_newest_first(&mut articles);
        Ok(articles)
    }

    pub async fn get_article(&self, id: u64) -> Result<Article> {
        if let Some(article) = self.snapshot().get(&id) {
            return Ok(article.clone());
        }

        match self.articles.load(id).await {
            Ok(Some(article)) => {
                // While a refresh is running the file may belong to the set it
                // is about to publish; leave the index to that swap.
                if let Ok(_guard) = self.refresh_lock.try_lock() {
                    self.insert(article.clone());
                }
                return Ok(article);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(id, error = %e, "Failed to read cached article"),
        }

        if self.ttl_elapsed() {
            match self.refresh_if_stale().await {
                Ok(_) => {
                    if let Some(article) = self.snapshot().get(&id) {
                        return Ok(article.clone());
                    }
                }
                Err(e) => tracing::warn!(id, error = %e, "Refresh during lookup failed"),
            }
        }

        Err(AppError::NotFound("Artikel nicht gefunden".to_string()))
    }

    /// Unconditional refresh. Concurrent callers queue behind each other.
    pub async fn refresh(&self) -> Result<usize> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes only if still needed once the refresh lock is held, so a
    /// burst of stale reads triggers a single upstream request.
    pub async fn refresh_if_stale(&self) -> Result<Option<usize>> {
        let _guard = self.refresh_lock.lock().await;
        if !self.needs_refresh() {
            return Ok(None);
        }
        self.refresh_locked().await.map(Some)
    }

    pub async fn status(&self) -> ServerStatus {
        self.status.current().await
    }

    pub async fn image(&self, name: &str) -> Result<Vec<u8>> {
        self.images.read(name).await
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Index {
        Arc::clone(&self.index.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap_index(&self, next: Index) {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn insert(&self, article: Article) {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut index).insert(article.id, article);
    }

    fn ttl_elapsed(&self) -> bool {
        self.last_refresh()
            .map_or(true, |at| at.elapsed() >= self.ttl)
    }

    fn needs_refresh(&self) -> bool {
        self.snapshot().is_empty() || self.ttl_elapsed()
    }

    async fn refresh_locked(&self) -> Result<usize> {
        tracing::info!(url = %self.source_url, "Refreshing article cache");

        match self.fetch_and_store().await {
            Ok(count) => Ok(count),
            Err(AppError::UpstreamEmpty) => {
                tracing::warn!("Upstream returned no articles, keeping cache");
                self.status.set(ServerStatus::online_without_articles()).await;
                Err(AppError::UpstreamEmpty)
            }
            Err(e) => {
                let status = if e.is_offline() {
                    ServerStatus::wordpress_offline()
                } else {
                    ServerStatus::error(format!("Fehler beim Aktualisieren der Daten: {}", e))
                };
                tracing::error!(error = %e, "Article refresh failed");
                self.status.set(status).await;
                Err(e)
            }
        }
    }

    async fn fetch_and_store(&self) -> Result<usize> {
        let response = self.fetcher.get(&self.source_url).await?;
        let posts = wordpress::parse_posts(&response.body)?;
        if posts.is_empty() {
            return Err(AppError::UpstreamEmpty);
        }

        let mut next = HashMap::with_capacity(posts.len());
        for post in posts {
            let id = post.id;
            let Some(mut article) = post.into_article() else {
                tracing::warn!(id, "Skipping post without a usable date");
                continue;
            };

            if article.has_featured_media() {
                self.cache_image(&mut article).await;
            }

            self.articles.save(&article).await?;
            next.insert(article.id, article);
        }

        if next.is_empty() {
            return Err(AppError::UpstreamEmpty);
        }

        let count = next.len();
        let next = Arc::new(next);
        self.swap_index(Arc::clone(&next));
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        let listing: Vec<Article> = next.values().cloned().collect();
        if let Err(e) = self.articles.save_legacy_list(&listing).await {
            tracing::warn!(error = %e, "Failed to write legacy article list");
        }

        self.status.set(ServerStatus::online(Utc::now())).await;
        tracing::info!(count, "Article cache refreshed");
        Ok(count)
    }

    async fn cache_image(&self, article: &mut Article) {
        if !self.images.exists(article.id).await {
            if let Err(e) = self
                .images
                .download(article.id, &article.featured_media_url)
                .await
            {
                tracing::warn!(
                    id = article.id,
                    url = %article.featured_media_url,
                    error = %e,
                    "Failed to download featured image"
                );
                return;
            }
        }
        article.cached_image_path = Some(ImageStore::public_path(article.id));
    }
}

/// Refreshes on a fixed interval, starting immediately. Failures are logged
/// and the next tick tries again.
pub fn spawn_refresh_timer(mirror: Arc<NewsMirror>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match mirror.refresh().await {
                Ok(count) => tracing::debug!(count, "Scheduled refresh done"),
                Err(e) => tracing::warn!(error = %e, "Scheduled refresh failed"),
            }
        }
    })
}
