mod articles;
mod response;
mod users;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::app::AppState;


pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(articles::server_status))
        .route("/api/articles", get(articles::list_articles))
        .route("/api/articles/:id", get(articles::get_article))
        .route("/api/images/:filename", get(articles::get_image))
        .route("/images/:filename", get(articles::get_image))
        .route("/api/login", post(users::login))
        .route("/api/refresh", post(users::login))
        .route("/api/user", post(users::user_data))
        .route("/nextcloud/status", get(nextcloud_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn nextcloud_status() -> Json<Value> {
    Json(json!({
        "status": "online",
        "success": true,
        "message": "Server is running",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserConfig, Config};
    use crate::models::UserProfile;
    use crate::store::ArticleStore;
    use crate::test_support::{article, spawn_server, unused_local_url, wp_post};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn state(dir: &TempDir, wordpress_url: String) -> Arc<AppState> {
        let config = Config {
            data_dir: dir.path().join("data"),
            cache_dir: dir.path().join("cache"),
            screenshots_dir: dir.path().join("screenshots"),
            wordpress_url,
            read_timeout_secs: 1,
            connect_timeout_secs: 1,
            browser: BrowserConfig {
                driver_path: dir.path().join("no-chromedriver"),
                ..BrowserConfig::default()
            },
            ..Config::default()
        };
        Arc::new(AppState::new(config).await.unwrap())
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn empty_wordpress() -> String {
        let router = Router::new().route("/posts", get(|| async { Json(json!([])) }));
        format!("{}/posts", spawn_server(router).await)
    }

    #[tokio::test]
    async fn test_empty_upstream_and_cache() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, empty_wordpress().await).await;

        let (status, body) = get_json(create_router(Arc::clone(&state)), "/api/articles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": false,
                "message": "Keine Artikel verfügbar. Die Schul-Website könnte offline sein.",
                "data": null,
            })
        );

        let (_, status) = get_json(create_router(state), "/api/status").await;
        assert_eq!(status["status"], "ONLINE");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_without_cache_is_500() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;

        let (status, body) = get_json(create_router(Arc::clone(&state)), "/api/articles").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);

        let (_, status) = get_json(create_router(state), "/api/status").await;
        assert_eq!(status["status"], "WORDPRESS_OFFLINE");
    }

    #[tokio::test]
    async fn test_articles_and_images() {
        let dir = TempDir::new().unwrap();
        let image_router = Router::new().route("/a.jpg", get(|| async { vec![1u8, 2, 3] }));
        let image_url = format!("{}/a.jpg", spawn_server(image_router).await);
        let posts = json!([
            wp_post(7, "2024-03-02T10:00:00", Some(&image_url)),
            wp_post(8, "2024-03-03T10:00:00", None),
        ]);
        let wordpress = Router::new().route("/posts", get(move || async move { Json(posts) }));
        let url = format!("{}/posts", spawn_server(wordpress).await);
        let state = state(&dir, url).await;

        let (status, body) = get_json(create_router(Arc::clone(&state)), "/api/articles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Artikel erfolgreich geladen");
        assert_eq!(body["data"][0]["id"], 8);
        assert_eq!(body["data"][1]["cachedImagePath"], "/images/image_7.jpg");
        assert_eq!(body["data"][1]["publishedAt"], "2024-03-02T10:00:00Z");

        let (status, body) = get_json(create_router(Arc::clone(&state)), "/api/articles/7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Beitrag 7");

        for uri in ["/images/image_7.jpg", "/api/images/image_7.jpg"] {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let response = create_router(Arc::clone(&state)).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(bytes.as_ref(), &[1, 2, 3]);
        }

        let (status, _) = get_json(create_router(state), "/api/images/image_8.jpg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_article_lookup_errors() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;

        let (status, body) = get_json(create_router(Arc::clone(&state)), "/api/articles/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = get_json(create_router(state), "/api/articles/404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Artikel nicht gefunden");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_article_from_file_cache() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(&dir.path().join("cache"));
        store.ensure_dirs().await.unwrap();
        store.save(&article(5, 9)).await.unwrap();
        let state = state(&dir, unused_local_url().await).await;

        let (status, body) = get_json(create_router(state), "/api/articles/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Artikel 5");
    }

    #[tokio::test]
    async fn test_login_requires_credentials() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;

        for body in [json!({}), json!({"username": "anna"}), json!({"password": "x"})] {
            for uri in ["/api/login", "/api/refresh"] {
                let (status, reply) = post_json(create_router(Arc::clone(&state)), uri, body.clone()).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(
                    reply,
                    json!({"success": false, "message": "Benutzername und Passwort sind erforderlich"})
                );
            }
        }
    }

    #[tokio::test]
    async fn test_login_extraction_failure_is_401() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;

        let (status, reply) = post_json(
            create_router(state),
            "/api/login",
            json!({"username": "anna", "password": "geheim"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply["success"], false);
        assert!(reply.get("data").is_none());
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;
        let profile = UserProfile {
            first_name: "Anna Maria".to_string(),
            last_name: "Schmidt".to_string(),
            email: "anna@schule.example".to_string(),
            school_class: "10b".to_string(),
            webdav_url: "https://cloud.example/remote.php/dav/files/abc/".to_string(),
        };
        state.users.upsert("anna", profile).await.unwrap();

        let (status, reply) =
            post_json(create_router(Arc::clone(&state)), "/api/user", json!({"username": "anna"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply,
            json!({
                "success": true,
                "user_id": 1,
                "username": "anna",
                "first_name": "Anna Maria",
                "last_name": "Schmidt",
                "email": "anna@schule.example",
                "school_class": "10b",
                "webdav_url": "https://cloud.example/remote.php/dav/files/abc/",
            })
        );

        let (status, reply) =
            post_json(create_router(Arc::clone(&state)), "/api/user", json!({"username": "ben"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(reply["message"], "Benutzer nicht gefunden");

        let (status, reply) = post_json(create_router(state), "/api/user", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["message"], "Benutzername ist erforderlich");
    }

    #[tokio::test]
    async fn test_nextcloud_status() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, unused_local_url().await).await;

        let (status, body) = get_json(create_router(state), "/nextcloud/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "online", "success": true, "message": "Server is running"})
        );
    }
}
