use axum::http::StatusCode;
use thiserror::Error;

use crate::feed::FetchError;
use crate::services::{ExtractionCause, ExtractionError};

/// User-visible failure classes. Handlers map these onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UpstreamTimeout,
    UpstreamHttp,
    UpstreamEmpty,
    Parse,
    CacheIo,
    NotFound,
    BadRequest,
    AuthFailed,
    ExtractionFailed,
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Upstream request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Upstream returned no articles")]
    UpstreamEmpty,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Fetch(FetchError::Timeout) => ErrorKind::UpstreamTimeout,
            AppError::Fetch(_) => ErrorKind::UpstreamHttp,
            AppError::UpstreamEmpty => ErrorKind::UpstreamEmpty,
            AppError::Json(_) => ErrorKind::Parse,
            AppError::Io(_) => ErrorKind::CacheIo,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Extraction(e) if matches!(e.cause, ExtractionCause::InvalidCredentials) => {
                ErrorKind::AuthFailed
            }
            AppError::Extraction(_) => ErrorKind::ExtractionFailed,
            AppError::Config(_) | AppError::Toml(_) | AppError::Other(_) => ErrorKind::Internal,
        }
    }

    /// True when the upstream could not be reached at all (timeouts, refused
    /// or reset connections), as opposed to answering with garbage.
    pub fn is_offline(&self) -> bool {
        matches!(self, AppError::Fetch(e) if e.is_offline())
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AuthFailed | ErrorKind::ExtractionFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to hand to end users.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => msg.clone(),
            _ => match self.kind() {
                ErrorKind::UpstreamTimeout => {
                    "Die Schul-Website ist nicht erreichbar.".to_string()
                }
                ErrorKind::UpstreamHttp => {
                    "Die Schul-Website hat mit einem Fehler geantwortet.".to_string()
                }
                ErrorKind::UpstreamEmpty => {
                    "Keine Artikel verfügbar. Die Schul-Website könnte offline sein.".to_string()
                }
                ErrorKind::Parse => {
                    "Die Daten der Schul-Website konnten nicht gelesen werden.".to_string()
                }
                ErrorKind::CacheIo => "Fehler beim Zugriff auf den Zwischenspeicher.".to_string(),
                ErrorKind::AuthFailed => {
                    "Anmeldung fehlgeschlagen. Bitte überprüfen Sie Ihre Anmeldedaten.".to_string()
                }
                ErrorKind::ExtractionFailed => {
                    "Die Benutzerdaten konnten nicht aus Nextcloud gelesen werden.".to_string()
                }
                ErrorKind::NotFound => "Nicht gefunden".to_string(),
                ErrorKind::BadRequest => "Ungültige Anfrage".to_string(),
                ErrorKind::Internal => "Interner Serverfehler".to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
