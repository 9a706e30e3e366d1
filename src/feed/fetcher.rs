use std::error::Error as _;
use std::io;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;
use url::Url;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    /// The server was reached but the exchange went wrong: redirect loops,
    /// broken bodies, undecodable payloads.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl FetchError {
    /// Timeouts and connection-level failures mean the site is unreachable.
    pub fn is_offline(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Network(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || has_io_error(&err, |kind| kind == io::ErrorKind::TimedOut) {
            FetchError::Timeout
        } else if err.is_builder() {
            FetchError::MalformedUrl(err.to_string())
        } else if err.is_connect() || has_io_error(&err, is_connection_lost) {
            FetchError::Network(err.to_string())
        } else {
            FetchError::Protocol(err.to_string())
        }
    }
}

fn is_connection_lost(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

fn has_io_error(err: &reqwest::Error, matches: impl Fn(io::ErrorKind) -> bool) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches(io_err.kind()) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Plain GET client shared by the news mirror and the image store.
/// `read_timeout` bounds each wait for data, not the whole transfer, so a
/// slow but steady download completes. Retries are left to the caller.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> crate::error::Result<Self> {
        let client = Client::builder()
            .read_timeout(read_timeout)
            .connect_timeout(connect_timeout)
            .redirect(Policy::limited(10))
            .user_agent(USER_AGENT_STRING)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::MalformedUrl(format!("{}: {}", url, e)))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, %status, "Upstream answered with an error status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;

        Ok(FetchResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}
