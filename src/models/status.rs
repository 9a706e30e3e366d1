use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerState {
    Starting,
    Online,
    WordpressOffline,
    Error,
}

/// Outcome of the most recent refresh, persisted next to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", into = "StatusView")]
pub struct ServerStatus {
    #[serde(rename = "status")]
    pub state: ServerState,
    pub message: String,
    #[serde(with = "super::timestamp")]
    pub last_update: DateTime<Utc>,
}

/// Wire form: adds `lastUpdateFormatted`, the local date-time without
/// offset. It is derived on output and ignored on input.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    status: ServerState,
    message: String,
    #[serde(with = "super::timestamp")]
    last_update: DateTime<Utc>,
    last_update_formatted: String,
}

impl From<ServerStatus> for StatusView {
    fn from(status: ServerStatus) -> Self {
        Self {
            last_update_formatted: status
                .last_update
                .with_timezone(&Local)
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string(),
            status: status.state,
            message: status.message,
            last_update: status.last_update,
        }
    }
}

impl ServerStatus {
    pub fn starting() -> Self {
        Self {
            state: ServerState::Starting,
            message: "Server wird gestartet...".to_string(),
            last_update: Utc::now(),
        }
    }

    pub fn online(refreshed_at: DateTime<Utc>) -> Self {
        Self {
            state: ServerState::Online,
            message: format!(
                "Server online, letzte Aktualisierung: {}",
                refreshed_at.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S")
            ),
            last_update: refreshed_at,
        }
    }

    /// The upstream answered but had nothing to publish; the cache was kept.
    pub fn online_without_articles() -> Self {
        Self {
            state: ServerState::Online,
            message: "Server online, die Schul-Website hat keine Artikel geliefert. Verwende zwischengespeicherte Daten.".to_string(),
            last_update: Utc::now(),
        }
    }

    pub fn wordpress_offline() -> Self {
        Self {
            state: ServerState::WordpressOffline,
            message: "Die Schul-Website ist nicht erreichbar. Verwende zwischengespeicherte Daten."
                .to_string(),
            last_update: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            state: ServerState::Error,
            message,
            last_update: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_serializes_screaming_snake_case() {
        let status = ServerStatus::wordpress_offline();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "WORDPRESS_OFFLINE");
        assert!(json["lastUpdate"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_formatted_last_update_is_local_and_ignored_on_read() {
        let at = Utc.with_ymd_and_hms(2024, 3, 8, 12, 34, 56).unwrap();
        let status = ServerStatus::online(at);
        let json = serde_json::to_value(&status).unwrap();

        let expected = at
            .with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        assert_eq!(json["lastUpdateFormatted"], expected.as_str());
        assert_eq!(json["lastUpdate"], "2024-03-08T12:34:56Z");

        let back: ServerStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_online_message_carries_timestamp() {
        let status = ServerStatus::online(Utc::now());
        assert_eq!(status.state, ServerState::Online);
        assert!(status.message.starts_with("Server online, letzte Aktualisierung: "));
    }
}
