use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const CONFIG_ENV_VAR: &str = "SCHOOL_PORTAL_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_wordpress_url")]
    pub wordpress_url: String,

    #[serde(default)]
    pub nextcloud: NextcloudConfig,

    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextcloudConfig {
    #[serde(default = "default_nextcloud_base_url")]
    pub base_url: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    #[serde(default = "default_files_path")]
    pub files_path: String,

    // Not queried; the profile comes from the rendered settings page.
    #[serde(default = "default_ocs_user_path")]
    pub ocs_user_path: String,

    #[serde(default = "default_webdav_prefix")]
    pub webdav_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_path")]
    pub browser_path: PathBuf,

    #[serde(default = "default_driver_path")]
    pub driver_path: PathBuf,

    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,

    #[serde(default = "default_login_settle_ms")]
    pub login_settle_ms: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("./screenshots")
}

fn default_cache_ttl_hours() -> u64 {
    1
}

fn default_refresh_interval_ms() -> u64 {
    3_600_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_wordpress_url() -> String {
    "https://marienschule-bielefeld.de/wp-json/wp/v2/posts?per_page=20&_embed".to_string()
}

fn default_nextcloud_base_url() -> String {
    "https://nextcloud-g2.bielefeld-marienschule.logoip.de".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_settings_path() -> String {
    "/index.php/settings/user".to_string()
}

fn default_files_path() -> String {
    "/index.php/apps/files/".to_string()
}

fn default_ocs_user_path() -> String {
    "/ocs/v1.php/cloud/user".to_string()
}

fn default_webdav_prefix() -> String {
    "/remote.php/dav/files/".to_string()
}

fn default_browser_path() -> PathBuf {
    PathBuf::from("/usr/bin/google-chrome")
}

fn default_driver_path() -> PathBuf {
    PathBuf::from("/usr/bin/chromedriver")
}

fn default_page_timeout_secs() -> u64 {
    10
}

fn default_login_settle_ms() -> u64 {
    3000
}

fn default_max_sessions() -> usize {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            screenshots_dir: default_screenshots_dir(),
            cache_ttl_hours: default_cache_ttl_hours(),
            refresh_interval_ms: default_refresh_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            wordpress_url: default_wordpress_url(),
            nextcloud: NextcloudConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for NextcloudConfig {
    fn default() -> Self {
        Self {
            base_url: default_nextcloud_base_url(),
            login_path: default_login_path(),
            settings_path: default_settings_path(),
            files_path: default_files_path(),
            ocs_user_path: default_ocs_user_path(),
            webdav_prefix: default_webdav_prefix(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser_path: default_browser_path(),
            driver_path: default_driver_path(),
            page_timeout_secs: default_page_timeout_secs(),
            login_settle_ms: default_login_settle_ms(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Config {
    /// Loads the config from `path` (or the default location), writing the
    /// defaults there first if the file does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `--config` wins, then `$SCHOOL_PORTAL_CONFIG`, then the user config dir.
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("school-portal")
            .join("config.toml")
    }

    fn validate(&self) -> Result<()> {
        if self.browser.max_sessions == 0 {
            return Err(AppError::Config(
                "browser.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(AppError::Config(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl NextcloudConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.base_url)
            .ok()?
            .host_str()
            .map(str::to_string)
    }
}
