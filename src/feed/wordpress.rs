//! The subset of the WordPress REST post schema the mirror consumes.

use serde::Deserialize;

use crate::models::Article;

use super::sanitizer::{parse_published_at, sanitize_content, sanitize_excerpt, sanitize_title};

#[derive(Debug, Deserialize)]
pub struct WpPost {
    pub id: u64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub title: Rendered,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub featured_media: u64,
    #[serde(default, rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default, rename = "wp:featuredmedia")]
    featured_media: Vec<EmbeddedMedia>,
}

// Protected media shows up as an error object without `source_url`.
#[derive(Debug, Deserialize)]
struct EmbeddedMedia {
    #[serde(default)]
    source_url: Option<String>,
}

pub fn parse_posts(body: &[u8]) -> serde_json::Result<Vec<WpPost>> {
    serde_json::from_slice(body)
}

impl WpPost {
    pub fn featured_media_url(&self) -> Option<&str> {
        self.embedded
            .as_ref()?
            .featured_media
            .first()?
            .source_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }

    /// Sanitized article for this post, or `None` when no usable publish
    /// date is present.
    pub fn into_article(self) -> Option<Article> {
        let published_at = self
            .date_gmt
            .as_deref()
            .and_then(parse_published_at)
            .or_else(|| self.date.as_deref().and_then(parse_published_at))?;

        let featured_media_url = self.featured_media_url().unwrap_or_default().to_string();
        let featured_media_id = if featured_media_url.is_empty() {
            0
        } else {
            self.featured_media
        };

        Some(Article {
            id: self.id,
            published_at,
            title: sanitize_title(&self.title.rendered),
            content_html: sanitize_content(&self.content.rendered),
            excerpt_html: sanitize_excerpt(&self.excerpt.rendered),
            canonical_link: self.link,
            featured_media_id,
            featured_media_url,
            cached_image_path: None,
        })
    }
}
