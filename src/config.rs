//! Runner configuration and timing constants.
//!
//! Environment-influenced values (remote debug port, persistent OAuth
//! profile directory) are read here; the rest of the crate consumes them
//! through `RunnerConfig`.

use std::path::PathBuf;

use tracing::{error, info, warn};

/// Desktop Chrome user agent presented by the stealth context and the
/// browser-less HTTP client.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Name of the application session cookie injected during cookie replay.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Upper bound for page load completion (document.readyState polling).
pub const PAGE_LOAD_WAIT_MS: u64 = 10_000;

/// Pause after clearing cookies so the simulated logout propagates.
pub const COOKIE_SET_WAIT_MS: u64 = 1_000;

/// Settle interval: fixed wait for asynchronous server-side check-in
/// logic to run after the triggering navigation or request.
pub const SIGNIN_TRIGGER_WAIT_MS: u64 = 5_000;

/// Bound on waiting for a login form element to appear.
pub const SELECTOR_WAIT_MS: u64 = 10_000;

/// Bound on the post-login navigation to the console/dashboard.
pub const LOGIN_NAV_TIMEOUT_MS: u64 = 15_000;

/// Bound on one leg of the OAuth round trip (human-interactive, long).
pub const OAUTH_WAIT_MS: u64 = 30_000;

/// Request timeout for the browser-less HTTP client.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default Chrome remote-debugging port for the attach path.
pub const DEFAULT_DEBUG_PORT: u16 = 9022;

/// Runner configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Run launched browsers headless
    pub headless: bool,
    /// Path to Chrome/Chromium executable (auto-detected when absent)
    pub chrome_path: Option<String>,
    /// Remote-debugging port probed by the OAuth attach path
    pub debug_port: u16,
    /// Persistent profile directory for the OAuth fallback browser
    pub oauth_profile_dir: Option<PathBuf>,
    /// Request timeout for the browser-less HTTP client, in seconds
    pub http_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            debug_port: debug_port_from_env(),
            oauth_profile_dir: default_oauth_profile_dir(),
            http_timeout_secs: HTTP_TIMEOUT_SECS,
        }
    }
}

/// Remote-debugging port, overridable via CHROME_DEBUG_PORT.
fn debug_port_from_env() -> u16 {
    std::env::var("CHROME_DEBUG_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DEBUG_PORT)
}

/// Dedicated profile directory for the persistent OAuth browser.
/// Separate from any real Chrome profile to avoid lock contention.
fn default_oauth_profile_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("waf-checkin").join("browser_profile"))
}

impl RunnerConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("waf-checkin").join("config.json"))
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Remote-debugging URL for the configured port
    pub fn debug_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.debug_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert!(config.headless);
        assert!(config.chrome_path.is_none());
        assert_eq!(config.http_timeout_secs, HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn test_debug_url_format() {
        let config = RunnerConfig {
            debug_port: 9022,
            ..Default::default()
        };
        assert_eq!(config.debug_url(), "http://127.0.0.1:9022");
    }

    #[test]
    fn test_config_roundtrip() {
        let config = RunnerConfig::default().headless(false);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RunnerConfig = serde_json::from_str(&json).unwrap();
        assert!(!parsed.headless);
    }
}
