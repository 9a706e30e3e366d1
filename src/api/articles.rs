use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app::AppState;
use crate::error::{AppError, Result};
use crate::models::{Article, ServerStatus};
use crate::store::IMAGE_CONTENT_TYPE;

use super::response::ApiResponse;

const LOADED_MESSAGE: &str = "Artikel erfolgreich geladen";

pub async fn server_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(state.mirror.status().await)
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Article>>>> {
    let articles = state.mirror.list_articles().await?;
    if articles.is_empty() {
        return Ok(Json(ApiResponse::failure(
            AppError::UpstreamEmpty.user_message(),
        )));
    }
    Ok(Json(ApiResponse::ok(LOADED_MESSAGE, articles)))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Article>>> {
    let id: u64 = id
        .parse()
        .map_err(|_| AppError::BadRequest("Ungültige Artikel-ID".to_string()))?;
    let article = state.mirror.get_article(id).await?;
    Ok(Json(ApiResponse::ok(LOADED_MESSAGE, article)))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response> {
    let bytes = state.mirror.image(&filename).await?;
    Ok(([(header::CONTENT_TYPE, IMAGE_CONTENT_TYPE)], bytes).into_response())
}
