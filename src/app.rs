use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::feed::{HttpFetcher, NewsMirror};
use crate::services::IdentityExtractor;
use crate::store::UserStore;

/// Everything the HTTP handlers and the refresh timer share.
pub struct AppState {
    pub config: Config,
    pub mirror: Arc<NewsMirror>,
    pub users: Arc<UserStore>,
    pub extractor: IdentityExtractor,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        provision_dirs(&config).await?;

        let fetcher = HttpFetcher::new(config.connect_timeout(), config.read_timeout())?;
        let mirror = NewsMirror::open(
            config.wordpress_url.clone(),
            config.cache_ttl(),
            fetcher,
            &config.cache_dir,
        )
        .await?;

        let users = Arc::new(UserStore::new(&config.data_dir));
        let extractor = IdentityExtractor::new(
            config.nextcloud.clone(),
            config.browser.clone(),
            config.screenshots_dir.clone(),
            Arc::clone(&users),
        );

        Ok(Self {
            config,
            mirror: Arc::new(mirror),
            users,
            extractor,
        })
    }
}

async fn provision_dirs(config: &Config) -> Result<()> {
    for dir in [&config.data_dir, &config.cache_dir, &config.screenshots_dir] {
        tokio::fs::create_dir_all(dir).await?;
        tracing::debug!(path = %dir.display(), "Directory ready");
    }
    Ok(())
}
