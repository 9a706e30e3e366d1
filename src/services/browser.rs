//! Headless Chrome driven over WebDriver.
//!
//! Every session gets its own chromedriver process on a free local port.
//! [`BrowserHarness::with_session`] tears the session down on every exit
//! path; if the surrounding future is dropped midway, [`SessionGuard`]
//! finishes the cleanup from its `Drop` impl.

use std::future::Future;
use std::net::TcpListener;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::BrowserConfig;

use super::nextcloud::{ExtractionCause, ExtractionError, ExtractionStep};

const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(200);

const CHROME_ARGS: [&str; 8] = [
    "--headless=new",
    "--disable-gpu",
    "--window-size=1920,1080",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-infobars",
    "--remote-allow-origins=*",
];

const LINUX_CHROME_ARGS: [&str; 2] = ["--disable-setuid-sandbox", "--single-process"];

pub struct BrowserHarness {
    config: BrowserConfig,
    screenshots_dir: PathBuf,
    sessions: Semaphore,
}

impl BrowserHarness {
    pub fn new(config: BrowserConfig, screenshots_dir: PathBuf) -> Self {
        let sessions = Semaphore::new(config.max_sessions.max(1));
        Self {
            config,
            screenshots_dir,
            sessions,
        }
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.config.page_timeout_secs)
    }

    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.config.login_settle_ms)
    }

    /// Runs `f` against a fresh browser. Waits for a free slot when
    /// `max_sessions` browsers are already running.
    pub async fn with_session<T, F, Fut>(&self, f: F) -> Result<T, ExtractionError>
    where
        F: FnOnce(BrowserSession) -> Fut,
        Fut: Future<Output = Result<T, ExtractionError>>,
    {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|e| launch_error(e.to_string()))?;

        let mut guard = self.launch().await?;
        let session = BrowserSession {
            client: guard.client()?,
            screenshots_dir: self.screenshots_dir.clone(),
            page_timeout: self.page_timeout(),
        };

        let outcome = AssertUnwindSafe(f(session)).catch_unwind().await;
        guard.shutdown().await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Browser session panicked");
                Err(ExtractionError::new(
                    ExtractionStep::Browser,
                    ExtractionCause::Panicked,
                ))
            }
        }
    }

    async fn launch(&self) -> Result<SessionGuard, ExtractionError> {
        let port = free_port().map_err(|e| launch_error(e.to_string()))?;
        let driver = Command::new(&self.config.driver_path)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                launch_error(format!("{}: {}", self.config.driver_path.display(), e))
            })?;
        let mut guard = SessionGuard {
            client: None,
            driver: Some(driver),
        };

        let webdriver_url = format!("http://127.0.0.1:{}", port);
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());

        let deadline = Instant::now() + self.page_timeout();
        loop {
            match builder.connect(&webdriver_url).await {
                Ok(client) => {
                    tracing::debug!(port, "Browser session started");
                    guard.client = Some(client);
                    return Ok(guard);
                }
                Err(e) if Instant::now() >= deadline => {
                    guard.shutdown().await;
                    return Err(launch_error(e.to_string()));
                }
                Err(_) => tokio::time::sleep(DRIVER_POLL_INTERVAL).await,
            }
        }
    }

    fn capabilities(&self) -> Map<String, Value> {
        let mut chrome_options = json!({ "args": chrome_args() });
        if cfg!(target_os = "linux") {
            chrome_options["binary"] = json!(self.config.browser_path);
        }

        let mut caps = Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), chrome_options);
        caps
    }
}

pub fn chrome_args() -> Vec<&'static str> {
    let mut args = CHROME_ARGS.to_vec();
    if cfg!(target_os = "linux") {
        args.extend(LINUX_CHROME_ARGS);
    }
    args
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn launch_error(message: String) -> ExtractionError {
    ExtractionError::new(ExtractionStep::Browser, ExtractionCause::Launch(message))
}

/// Owns the WebDriver session and the driver process until shutdown.
struct SessionGuard {
    client: Option<Client>,
    driver: Option<Child>,
}

impl SessionGuard {
    fn client(&self) -> Result<Client, ExtractionError> {
        self.client
            .clone()
            .ok_or_else(|| launch_error("session already closed".to_string()))
    }

    async fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                tracing::debug!(error = %e, "Closing browser session failed");
            }
        }
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.kill().await {
                tracing::debug!(error = %e, "Stopping chromedriver failed");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.client.is_none() && self.driver.is_none() {
            return;
        }
        let client = self.client.take();
        let driver = self.driver.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(client) = client {
                    let _ = client.close().await;
                }
                if let Some(mut driver) = driver {
                    let _ = driver.kill().await;
                }
            });
        }
    }
}

/// Handle passed to extraction steps.
#[derive(Clone)]
pub struct BrowserSession {
    client: Client,
    screenshots_dir: PathBuf,
    page_timeout: Duration,
}

impl BrowserSession {
    pub async fn goto(&self, url: &str) -> Result<(), CmdError> {
        self.client.goto(url).await
    }

    pub async fn title(&self) -> Result<String, CmdError> {
        self.client.title().await
    }

    pub async fn source(&self) -> Result<String, CmdError> {
        self.client.source().await
    }

    pub async fn current_host(&self) -> Result<Option<String>, CmdError> {
        let url = self.client.current_url().await?;
        Ok(url.host_str().map(str::to_string))
    }

    /// Waits up to the page timeout for at least one element matching `css`.
    pub async fn wait_for(&self, css: &str) -> Result<Element, CmdError> {
        self.client
            .wait()
            .at_most(self.page_timeout)
            .for_element(Locator::Css(css))
            .await
    }

    pub async fn find_all(&self, css: &str) -> Result<Vec<Element>, CmdError> {
        self.client.find_all(Locator::Css(css)).await
    }

    /// First element under `scope` matched by any selector, tried in order.
    pub async fn find_first_in(scope: &Element, selectors: &[&str]) -> Option<Element> {
        for css in selectors {
            if let Ok(element) = scope.find(Locator::Css(css)).await {
                return Some(element);
            }
        }
        None
    }

    /// Best effort; failures are only logged.
    pub async fn screenshot(&self, name: &str) {
        let png = match self.client.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(name, error = %e, "Failed to capture screenshot");
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshots_dir).await {
            tracing::warn!(error = %e, "Failed to create screenshots directory");
            return;
        }
        let path = self.screenshots_dir.join(name);
        match tokio::fs::write(&path, png).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Saved screenshot"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save screenshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chrome_args() {
        let args = chrome_args();
        assert_eq!(&args[..8], &CHROME_ARGS);
        if cfg!(target_os = "linux") {
            assert!(args.contains(&"--single-process"));
            assert!(args.contains(&"--disable-setuid-sandbox"));
        }
    }

    #[test]
    fn test_capabilities() {
        let harness = BrowserHarness::new(BrowserConfig::default(), PathBuf::from("shots"));
        let caps = harness.capabilities();
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        if cfg!(target_os = "linux") {
            assert_eq!(caps["goog:chromeOptions"]["binary"], "/usr/bin/google-chrome");
        }
    }

    #[tokio::test]
    async fn test_missing_driver_binary_fails_launch() {
        let dir = TempDir::new().unwrap();
        let config = BrowserConfig {
            driver_path: dir.path().join("no-such-chromedriver"),
            ..BrowserConfig::default()
        };
        let harness = BrowserHarness::new(config, dir.path().join("shots"));

        let err = harness
            .with_session(|_session| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.step, ExtractionStep::Browser);
        assert!(matches!(err.cause, ExtractionCause::Launch(_)));
    }
}
