use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::AppError;
use crate::models::User;

use super::response::FlatError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    username: Option<String>,
}

/// A stored user record with `success: true` mixed in.
#[derive(Debug, Serialize)]
pub struct UserReply {
    success: bool,
    #[serde(flatten)]
    user: User,
}

impl From<User> for UserReply {
    fn from(user: User) -> Self {
        Self {
            success: true,
            user,
        }
    }
}

/// Serves both `/api/login` and `/api/refresh`: each call runs a full
/// browser login and overwrites the stored profile.
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Option<Json<LoginRequest>>,
) -> Result<Json<UserReply>, FlatError> {
    let request = body.map(|Json(request)| request);
    let (username, password) = match request {
        Some(LoginRequest {
            username: Some(username),
            password: Some(password),
        }) if !username.trim().is_empty() && !password.is_empty() => (username, password),
        _ => {
            return Err(AppError::BadRequest(
                "Benutzername und Passwort sind erforderlich".to_string(),
            )
            .into())
        }
    };

    let user = state.extractor.login(username.trim(), &password).await?;
    Ok(Json(user.into()))
}

pub async fn user_data(
    State(state): State<Arc<AppState>>,
    body: Option<Json<UserRequest>>,
) -> Result<Json<UserReply>, FlatError> {
    let username = body
        .and_then(|Json(request)| request.username)
        .filter(|username| !username.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Benutzername ist erforderlich".to_string()))?;

    let user = state
        .users
        .find(username.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("Benutzer nicht gefunden".to_string()))?;
    Ok(Json(user.into()))
}
