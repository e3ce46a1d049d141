//! Stealth browser sessions.
//!
//! Launches an isolated, disposable Chrome profile configured to look
//! like a genuine desktop browser: realistic user agent and viewport,
//! TLS-error tolerance, CSP bypass, and an init script that suppresses
//! the automation signals fingerprinting scripts probe for.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, SetBypassCspParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, info};

use super::page::CdpPage;
use crate::config::{RunnerConfig, CHROME_USER_AGENT};
use crate::signin::SigninError;

/// Init script injected before any page script runs. Hides the webdriver
/// flag, fakes the Chrome runtime object, populates plugin and language
/// lists, neutralizes the permissions probe, and reports a common
/// consumer GPU from the WebGL parameter query.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {
    get: () => undefined,
    configurable: true
});

window.navigator.chrome = {
    runtime: {},
    loadTimes: function() {},
    csi: function() {},
    app: {}
};

Object.defineProperty(navigator, 'plugins', {
    get: () => {
        const plugins = [
            {name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer'},
            {name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai'},
            {name: 'Native Client', filename: 'internal-nacl-plugin'}
        ];
        plugins.item = (index) => plugins[index];
        plugins.namedItem = (name) => plugins.find(p => p.name === name);
        plugins.refresh = () => {};
        return plugins;
    },
    configurable: true
});

Object.defineProperty(navigator, 'languages', {
    get: () => ['zh-CN', 'zh', 'en-US', 'en'],
    configurable: true
});

const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
);

const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function(parameter) {
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return getParameter.apply(this, arguments);
};
"#;

/// Find Chrome/Chromium executable on the system
pub fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Unique profile directory for one session. Never reused: stale profiles
/// can carry stale automation fingerprints or lock files.
fn fresh_profile_dir() -> PathBuf {
    std::env::temp_dir()
        .join("waf-checkin")
        .join("profiles")
        .join(uuid::Uuid::new_v4().to_string())
}

/// Spawn the CDP event handler loop for a launched or attached browser.
pub fn spawn_handler(
    mut handler: chromiumoxide::handler::Handler,
    label: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
        debug!("Session {} browser event handler ended", label);
    })
}

/// An owned, ephemeral stealth browser session: browser process, fresh
/// profile directory, and a single page. Exclusively owned by one
/// invocation and destroyed at its end regardless of outcome.
pub struct StealthSession {
    id: String,
    browser: Option<Browser>,
    page: Arc<CdpPage>,
    profile_dir: Option<PathBuf>,
    handler_task: Option<tokio::task::JoinHandle<()>>,
}

impl StealthSession {
    /// Launch a stealth session: isolated profile, headless by default,
    /// stealth flags, init script installed before any navigation.
    pub async fn launch(config: &RunnerConfig) -> Result<Self, SigninError> {
        let id = uuid::Uuid::new_v4().to_string();
        let profile_dir = fresh_profile_dir();
        std::fs::create_dir_all(&profile_dir)?;

        info!(
            "Launching stealth session {} (headless: {})",
            id, config.headless
        );

        let chrome_path = match &config.chrome_path {
            Some(path) => PathBuf::from(path),
            None => find_chrome().ok_or_else(|| {
                SigninError::LaunchFailed(
                    "Chrome/Chromium not found; install it or set chrome_path".to_string(),
                )
            })?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&profile_dir)
            .window_size(1920, 1080)
            // chromiumoxide's own headless flag is the legacy mode; drive
            // the new one explicitly
            .with_head();

        if config.headless {
            builder = builder.arg("--headless=new");
        }

        builder = builder
            // Anti-detection
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-automation")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-features=IsolateOrigins,site-per-process,AutomationControlled")
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-restore-session-state")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-notifications")
            .arg("--disable-domain-reliability")
            .arg("--disable-component-update")
            // Target sites may present certificates the automation host
            // does not trust
            .arg("--ignore-certificate-errors")
            // Required when running as root (e.g., in Docker or on a VPS)
            .arg("--no-sandbox");

        let browser_config = builder
            .build()
            .map_err(SigninError::LaunchFailed)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SigninError::LaunchFailed(e.to_string()))?;

        let handler_task = spawn_handler(handler, id.clone());

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SigninError::LaunchFailed(e.to_string()))?;

        prepare_stealth_page(&page).await?;

        debug!("Stealth session {} ready (profile {:?})", id, profile_dir);

        Ok(Self {
            id,
            browser: Some(browser),
            page: Arc::new(CdpPage::new(page)),
            profile_dir: Some(profile_dir),
            handler_task: Some(handler_task),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's page.
    pub fn page(&self) -> Arc<CdpPage> {
        self.page.clone()
    }

    /// Tear the session down: close page and browser, then best-effort
    /// removal of the profile directory. Cleanup failures are swallowed;
    /// they cannot affect correctness, only leave a leftover directory.
    pub async fn teardown(&mut self) {
        self.page.close().await;

        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
            // brief grace period for Chrome child processes to exit
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = browser.kill().await;
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        if let Some(dir) = self.profile_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!("Profile dir cleanup skipped for {:?}: {}", dir, e);
            }
        }

        info!("Stealth session {} closed", self.id);
    }
}

/// Apply the stealth setup to a fresh page: CSP bypass so the init
/// script can run on strict pages, user-agent override, and the init
/// script itself ahead of any navigation.
pub async fn prepare_stealth_page(page: &Page) -> Result<(), SigninError> {
    page.execute(SetBypassCspParams::new(true))
        .await
        .map_err(|e| SigninError::LaunchFailed(format!("Failed to bypass CSP: {}", e)))?;

    page.execute(SetUserAgentOverrideParams::new(CHROME_USER_AGENT.to_string()))
        .await
        .map_err(|e| SigninError::LaunchFailed(format!("Failed to set UA override: {}", e)))?;

    let script_params = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(STEALTH_SCRIPT)
        .build()
        .map_err(SigninError::LaunchFailed)?;
    page.execute(script_params)
        .await
        .map_err(|e| SigninError::LaunchFailed(format!("Failed to inject init script: {}", e)))?;

    Ok(())
}
