//! Shared helpers for unit tests: throwaway HTTP servers and fixtures.

use axum::Router;
use chrono::{TimeZone, Utc};
use tokio::net::TcpListener;

use crate::models::Article;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A local URL nothing is listening on, so connections get refused.
pub async fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/wp-json/wp/v2/posts", addr)
}

pub fn article(id: u64, day: u32) -> Article {
    Article {
        id,
        published_at: Utc.with_ymd_and_hms(2024, 3, day, 8, 30, 0).unwrap(),
        title: format!("Artikel {}", id),
        content_html: format!("<p>Inhalt {}</p>", id),
        excerpt_html: format!("<p>Auszug {}</p>", id),
        canonical_link: format!("https://schule.example/artikel-{}/", id),
        featured_media_id: 0,
        featured_media_url: String::new(),
        cached_image_path: None,
    }
}

/// One WordPress REST post record, shaped like `/wp-json/wp/v2/posts?_embed`.
pub fn wp_post(id: u64, date: &str, image_url: Option<&str>) -> serde_json::Value {
    let mut post = serde_json::json!({
        "id": id,
        "date": date,
        "title": { "rendered": format!("Beitrag <em>{}</em>", id) },
        "content": { "rendered": format!("<p>Text {} [&hellip;]", id) },
        "excerpt": { "rendered": format!("<p>Kurz {}&hellip;</p>", id) },
        "link": format!("https://schule.example/?p={}", id),
        "featured_media": if image_url.is_some() { 900 + id } else { 0 },
        "status": "publish",
    });
    if let Some(url) = image_url {
        post["_embedded"] = serde_json::json!({
            "wp:featuredmedia": [{ "id": 900 + id, "source_url": url }]
        });
    }
    post
}
