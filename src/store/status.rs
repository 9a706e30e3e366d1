use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::models::ServerStatus;

use super::write_json_atomic;

/// The persisted `server_status.json`. Writes are serialized by the mutex.
pub struct StatusStore {
    path: PathBuf,
    current: Mutex<ServerStatus>,
}

impl StatusStore {
    pub async fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join("server_status.json");

        let (status, persist) = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<ServerStatus>(&bytes) {
                Ok(status) => {
                    tracing::info!(state = ?status.state, "Loaded server status from cache");
                    (status, false)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Server status file is corrupt");
                    (
                        ServerStatus::error(format!(
                            "Fehler beim Laden des Server-Status: {}",
                            e
                        )),
                        true,
                    )
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => (ServerStatus::starting(), true),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read server status");
                (
                    ServerStatus::error(format!("Fehler beim Laden des Server-Status: {}", e)),
                    true,
                )
            }
        };

        let store = Self {
            path,
            current: Mutex::new(status.clone()),
        };
        if persist {
            store.persist(&status).await;
        }
        store
    }

    pub async fn current(&self) -> ServerStatus {
        self.current.lock().await.clone()
    }

    pub async fn set(&self, status: ServerStatus) {
        let mut current = self.current.lock().await;
        self.persist(&status).await;
        *current = status;
    }

    async fn persist(&self, status: &ServerStatus) {
        if let Err(e) = write_json_atomic(&self.path, status).await {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to save server status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerState;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fresh_start_persists_starting_state() {
        let dir = TempDir::new().unwrap();
        let store = StatusStore::open(dir.path()).await;

        assert_eq!(store.current().await.state, ServerState::Starting);
        assert!(dir.path().join("server_status.json").exists());
    }

    #[tokio::test]
    async fn test_status_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let store = StatusStore::open(dir.path()).await;
            store.set(ServerStatus::wordpress_offline()).await;
        }

        let reopened = StatusStore::open(dir.path()).await;
        assert_eq!(reopened.current().await.state, ServerState::WordpressOffline);
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_error_state() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("server_status.json"), "garbage").unwrap();

        let store = StatusStore::open(dir.path()).await;
        let status = store.current().await;
        assert_eq!(status.state, ServerState::Error);
        assert!(status.message.starts_with("Fehler beim Laden des Server-Status"));
    }
}
