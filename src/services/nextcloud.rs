use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fantoccini::error::CmdError;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::{BrowserConfig, NextcloudConfig};
use crate::error::Result;
use crate::models::{User, UserProfile};
use crate::store::UserStore;

use super::browser::{BrowserHarness, BrowserSession};
use super::profile::scrape_settings_page;

const SETTINGS_TITLES: [&str; 3] = ["Einstellungen", "Settings", "Persönliche Informationen"];
const LOGIN_FORM_MARKERS: [&str; 2] = ["session_code=", "execution="];

const USERNAME_SELECTORS: [&str; 3] = ["#username", "[name=username]", "input[type=text]"];
const PASSWORD_SELECTORS: [&str; 3] = ["#password", "[name=password]", "input[type=password]"];
const SUBMIT_SELECTORS: [&str; 3] = ["#kc-login", "button[type=submit]", "input[type=submit]"];

const TITLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStep {
    Browser,
    NavigateLogin,
    DiscoverForm,
    SubmitCredentials,
    WaitReturn,
    AwaitSettings,
    Scrape,
}

impl fmt::Display for ExtractionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStep::Browser => "browser",
            ExtractionStep::NavigateLogin => "navigate_login",
            ExtractionStep::DiscoverForm => "discover_form",
            ExtractionStep::SubmitCredentials => "submit_credentials",
            ExtractionStep::WaitReturn => "wait_return",
            ExtractionStep::AwaitSettings => "await_settings",
            ExtractionStep::Scrape => "scrape",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ExtractionCause {
    #[error("browser could not be started: {0}")]
    Launch(String),

    #[error("browser command failed: {0}")]
    Browser(String),

    #[error("no login form found")]
    FormNotFound,

    #[error("no {0} field in the login form")]
    FieldNotFound(&'static str),

    #[error("credentials were rejected")]
    InvalidCredentials,

    #[error("page did not load in time")]
    Timeout,

    #[error("browser session panicked")]
    Panicked,
}

#[derive(Debug, Error)]
#[error("Nextcloud extraction failed at {step}: {cause}")]
pub struct ExtractionError {
    pub step: ExtractionStep,
    pub cause: ExtractionCause,
}

impl ExtractionError {
    pub fn new(step: ExtractionStep, cause: ExtractionCause) -> Self {
        Self { step, cause }
    }

    fn browser(step: ExtractionStep) -> impl FnOnce(CmdError) -> Self {
        move |e| Self::new(step, ExtractionCause::Browser(e.to_string()))
    }
}

/// Logs into Nextcloud through its Keycloak front door and reads the user's
/// profile off the personal settings page.
pub struct IdentityExtractor {
    harness: BrowserHarness,
    nextcloud: NextcloudConfig,
    users: Arc<UserStore>,
}

impl IdentityExtractor {
    pub fn new(
        nextcloud: NextcloudConfig,
        browser: BrowserConfig,
        screenshots_dir: std::path::PathBuf,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            harness: BrowserHarness::new(browser, screenshots_dir),
            nextcloud,
            users,
        }
    }

    /// Runs the full login pipeline and stores the resulting profile.
    /// No retries; the first failing step ends the attempt.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        tracing::info!(username, "Starting Nextcloud login");
        let started = Instant::now();

        let profile = self
            .harness
            .with_session(|session| self.extract(session, username, password))
            .await
            .map_err(|e| {
                tracing::warn!(username, step = %e.step, cause = %e.cause, "Nextcloud login failed");
                e
            })?;

        let user = self.users.upsert(username, profile).await?;
        tracing::info!(
            username,
            user_id = user.internal_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Nextcloud login succeeded"
        );
        Ok(user)
    }

    async fn extract(
        &self,
        session: BrowserSession,
        username: &str,
        password: &str,
    ) -> std::result::Result<UserProfile, ExtractionError> {
        use ExtractionStep::*;

        let login_url = self.nextcloud.url(&self.nextcloud.login_path);
        tracing::debug!(url = %login_url, "Opening login page");
        session
            .goto(&login_url)
            .await
            .map_err(ExtractionError::browser(NavigateLogin))?;
        session.screenshot("login_page.png").await;

        session
            .wait_for("form")
            .await
            .map_err(|_| ExtractionError::new(DiscoverForm, ExtractionCause::FormNotFound))?;
        let forms = session
            .find_all("form")
            .await
            .map_err(ExtractionError::browser(DiscoverForm))?;
        let mut login_form = None;
        for form in forms {
            let action = form
                .attr("action")
                .await
                .map_err(ExtractionError::browser(DiscoverForm))?;
            if action.as_deref().is_some_and(is_login_form_action) {
                login_form = Some(form);
                break;
            }
        }
        let form = login_form
            .ok_or_else(|| ExtractionError::new(DiscoverForm, ExtractionCause::FormNotFound))?;

        let username_field = BrowserSession::find_first_in(&form, &USERNAME_SELECTORS)
            .await
            .ok_or_else(|| {
                ExtractionError::new(SubmitCredentials, ExtractionCause::FieldNotFound("username"))
            })?;
        let password_field = BrowserSession::find_first_in(&form, &PASSWORD_SELECTORS)
            .await
            .ok_or_else(|| {
                ExtractionError::new(SubmitCredentials, ExtractionCause::FieldNotFound("password"))
            })?;
        username_field
            .send_keys(username)
            .await
            .map_err(ExtractionError::browser(SubmitCredentials))?;
        password_field
            .send_keys(password)
            .await
            .map_err(ExtractionError::browser(SubmitCredentials))?;
        session.screenshot("before_login.png").await;

        let submit = BrowserSession::find_first_in(&form, &SUBMIT_SELECTORS)
            .await
            .ok_or_else(|| {
                ExtractionError::new(SubmitCredentials, ExtractionCause::FieldNotFound("submit"))
            })?;
        submit
            .click()
            .await
            .map_err(ExtractionError::browser(SubmitCredentials))?;

        tokio::time::sleep(self.harness.login_settle()).await;
        let settings_url = self.nextcloud.url(&self.nextcloud.settings_path);
        session
            .goto(&settings_url)
            .await
            .map_err(ExtractionError::browser(WaitReturn))?;

        if !self.await_settings_title(&session).await {
            session.screenshot("settings_error.png").await;
            let host = session
                .current_host()
                .await
                .map_err(ExtractionError::browser(AwaitSettings))?;
            let cause = if host.is_some() && host != self.nextcloud.host() {
                ExtractionCause::InvalidCredentials
            } else {
                ExtractionCause::Timeout
            };
            return Err(ExtractionError::new(AwaitSettings, cause));
        }
        session.screenshot("settings_page.png").await;

        let source = session
            .source()
            .await
            .map_err(ExtractionError::browser(Scrape))?;
        let scraped = scrape_settings_page(&source);
        for field in scraped.missing_fields() {
            tracing::warn!(username, ?field, "Profile field not found on settings page");
            session.screenshot(field.screenshot_name()).await;
        }

        Ok(scraped.into_profile(&self.nextcloud.base_url, &self.nextcloud.webdav_prefix))
    }

    async fn await_settings_title(&self, session: &BrowserSession) -> bool {
        let deadline = Instant::now() + self.harness.page_timeout();
        loop {
            if let Ok(title) = session.title().await {
                if is_settings_title(&title) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(TITLE_POLL_INTERVAL).await;
        }
    }
}

fn is_login_form_action(action: &str) -> bool {
    LOGIN_FORM_MARKERS.iter().any(|marker| action.contains(marker))
}

fn is_settings_title(title: &str) -> bool {
    SETTINGS_TITLES.iter().any(|t| title.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_login_form_detection() {
        assert!(is_login_form_action(
            "https://sso.example/realms/schule/login-actions/authenticate?session_code=abc&execution=x"
        ));
        assert!(is_login_form_action("/login-actions/authenticate?execution=1"));
        assert!(!is_login_form_action("/search"));
    }

    #[test]
    fn test_settings_title_detection() {
        assert!(is_settings_title("Persönliche Informationen - Einstellungen - Nextcloud"));
        assert!(is_settings_title("Settings - Nextcloud"));
        assert!(!is_settings_title("Anmelden bei Schule"));
    }

    #[test]
    fn test_error_display_names_step() {
        let err = ExtractionError::new(ExtractionStep::DiscoverForm, ExtractionCause::FormNotFound);
        assert_eq!(
            err.to_string(),
            "Nextcloud extraction failed at discover_form: no login form found"
        );
    }

    #[tokio::test]
    async fn test_login_without_browser_fails_and_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let users = Arc::new(UserStore::new(dir.path()));
        let browser = BrowserConfig {
            driver_path: dir.path().join("missing-driver"),
            ..BrowserConfig::default()
        };
        let extractor = IdentityExtractor::new(
            NextcloudConfig::default(),
            browser,
            dir.path().join("screenshots"),
            Arc::clone(&users),
        );

        let err = extractor.login("anna", "geheim").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ExtractionFailed);
        assert!(users.all().await.unwrap().is_empty());
    }
}
