use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sanitized WordPress post as served to clients and stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: u64,
    #[serde(with = "super::timestamp")]
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub content_html: String,
    pub excerpt_html: String,
    pub canonical_link: String,
    #[serde(default)]
    pub featured_media_id: u64,
    #[serde(default)]
    pub featured_media_url: String,
    /// Only set once the image blob exists locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_image_path: Option<String>,
}

impl Article {
    pub fn has_featured_media(&self) -> bool {
        !self.featured_media_url.is_empty()
    }
}

/// Newest first; equal timestamps fall back to ascending id.
pub fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
