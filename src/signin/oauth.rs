//! OAuth sign-in through an already-authenticated browser.
//!
//! Prefers attaching to a running Chrome exposed on the remote-debugging
//! port; falls back to a dedicated persistent, visible profile so a human
//! can complete a one-time provider login that survives across runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::HandlerConfig;
use tracing::debug;

use crate::browser::{
    find_chrome, prepare_stealth_page, spawn_handler, CdpPage, PageDriver,
};
use crate::config::{RunnerConfig, OAUTH_WAIT_MS, PAGE_LOAD_WAIT_MS, SIGNIN_TRIGGER_WAIT_MS};
use crate::signin::selectors::oauth_locators;
use crate::signin::{
    click_first, conclude, Account, ApiCallLog, BrowserResult, Logger, OauthProvider, SigninError,
    SigninSession,
};

/// Poll interval while waiting for the OAuth round trip to come back.
const RETURN_POLL_MS: u64 = 500;

/// Check whether the remote-debugging port accepts connections.
async fn debug_port_open(port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            Duration::from_secs(1),
            tokio::net::TcpStream::connect(("127.0.0.1", port)),
        )
        .await,
        Ok(Ok(_))
    )
}

/// Resolve the websocket debugger URL of a running Chrome instance.
async fn resolve_ws_url(debug_url: &str) -> Result<String, SigninError> {
    let version_url = format!("{}/json/version", debug_url.trim_end_matches('/'));
    let resp: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .map_err(|e| SigninError::LaunchFailed(format!("debug port probe failed: {}", e)))?
        .json()
        .await
        .map_err(|e| SigninError::LaunchFailed(format!("debug port response invalid: {}", e)))?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SigninError::LaunchFailed("no webSocketDebuggerUrl in response".to_string()))
}

/// Browser session for the OAuth path. Two acquisition modes with an
/// asymmetric release contract: an attached browser is shared and must
/// only be detached from (close our page, drop the connection), while the
/// dedicated persistent-profile browser is closed outright. The profile
/// directory persists either way.
pub struct OauthSession {
    browser: Option<Browser>,
    page: Arc<CdpPage>,
    handler_task: Option<tokio::task::JoinHandle<()>>,
    attached: bool,
}

impl OauthSession {
    /// Attach over CDP when the debug port is live, otherwise launch the
    /// persistent visible profile.
    pub async fn acquire(config: &RunnerConfig, logger: &Logger) -> Result<Self, SigninError> {
        if debug_port_open(config.debug_port).await {
            logger.log(&format!(
                "[cdp] remote-debugging port {} detected, attaching...",
                config.debug_port
            ));
            return Self::attach(config).await;
        }

        logger.log("[info] using dedicated persistent browser profile...");
        Self::launch_persistent(config, logger).await
    }

    async fn attach(config: &RunnerConfig) -> Result<Self, SigninError> {
        let ws_url = resolve_ws_url(&config.debug_url()).await?;
        debug!("Connecting to running browser at {}", ws_url);

        let handler_config = HandlerConfig {
            request_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| SigninError::LaunchFailed(format!("CDP attach failed: {}", e)))?;

        let handler_task = spawn_handler(handler, "oauth-attached".to_string());

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SigninError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            browser: Some(browser),
            page: Arc::new(CdpPage::new(page)),
            handler_task: Some(handler_task),
            attached: true,
        })
    }

    async fn launch_persistent(
        config: &RunnerConfig,
        logger: &Logger,
    ) -> Result<Self, SigninError> {
        let profile_dir = config.oauth_profile_dir.clone().ok_or_else(|| {
            SigninError::LaunchFailed("no config directory for the OAuth profile".to_string())
        })?;
        std::fs::create_dir_all(&profile_dir)?;

        if !profile_dir.join("Default").exists() {
            logger.log("[first-run] no saved profile yet: complete the provider login in the opening browser");
            logger.log("[hint] the login persists in this profile for future runs");
        }

        let chrome_path = match &config.chrome_path {
            Some(path) => PathBuf::from(path),
            None => find_chrome().ok_or_else(|| {
                SigninError::LaunchFailed(
                    "Chrome/Chromium not found; install it or set chrome_path".to_string(),
                )
            })?,
        };

        let browser_config = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&profile_dir)
            // the human completes the provider authorization, so headful
            .with_head()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--ignore-certificate-errors")
            .build()
            .map_err(SigninError::LaunchFailed)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SigninError::LaunchFailed(e.to_string()))?;

        let handler_task = spawn_handler(handler, "oauth-persistent".to_string());

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SigninError::LaunchFailed(e.to_string()))?;
        prepare_stealth_page(&page).await?;

        Ok(Self {
            browser: Some(browser),
            page: Arc::new(CdpPage::new(page)),
            handler_task: Some(handler_task),
            attached: false,
        })
    }
}

#[async_trait::async_trait]
impl SigninSession for OauthSession {
    fn page(&self) -> Arc<dyn PageDriver> {
        self.page.clone()
    }

    async fn teardown(&mut self) {
        // always release our page
        self.page.close().await;

        if let Some(mut browser) = self.browser.take() {
            if self.attached {
                // shared browser: detach only, never close the process
                debug!("Detaching from shared browser");
                drop(browser);
            } else {
                let _ = browser.close().await;
            }
        }

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

pub async fn run(
    account: &Account,
    provider: OauthProvider,
    config: &RunnerConfig,
    logger: &Logger,
) -> BrowserResult {
    logger.log(&format!(
        "[browser] {}: OAuth sign-in via existing browser state ({})...",
        account.name, provider
    ));

    let session = match OauthSession::acquire(config, logger).await {
        Ok(session) => session,
        Err(e) => {
            logger.log(&format!("[fail] {}: browser acquisition failed: {}", account.name, e));
            return BrowserResult::fail(e, vec![]);
        }
    };

    let page = session.page();
    let outcome = flow(page.as_ref(), account, provider, logger).await;
    conclude(session, outcome, logger, &account.name).await
}

pub(crate) async fn flow(
    page: &dyn PageDriver,
    account: &Account,
    provider: OauthProvider,
    logger: &Logger,
) -> Result<BrowserResult, SigninError> {
    let api_calls = ApiCallLog::new();
    page.record_api_calls(&api_calls, logger).await;

    logger.log(&format!("[browser] {}: visiting login page...", account.name));
    page.goto(&account.login_url).await?;
    page.wait_for_load(Duration::from_millis(PAGE_LOAD_WAIT_MS))
        .await;

    // an authenticated browser gets redirected off the login path; the
    // page load alone has then triggered the check-in
    let current_url = page.current_url().await?;
    if !current_url.to_lowercase().contains("/login") {
        logger.log(&format!(
            "[ok] {}: already authenticated, redirected to {}",
            account.name, current_url
        ));
        logger.log(&format!(
            "[info] {}: check-in should have been triggered by the page load",
            account.name
        ));
        tokio::time::sleep(Duration::from_millis(SIGNIN_TRIGGER_WAIT_MS)).await;
        return Ok(BrowserResult::ok(Default::default(), api_calls.snapshot()));
    }

    logger.log(&format!(
        "[login] {}: clicking {} sign-in button...",
        account.name, provider
    ));
    if !click_first(page, oauth_locators(provider)).await {
        logger.log(&format!(
            "[fail] {}: {} sign-in button not found",
            account.name, provider
        ));
        return Ok(BrowserResult::fail_with(
            SigninError::ElementNotFound(format!("{} sign-in button", provider)),
            Default::default(),
            api_calls.snapshot(),
        ));
    }

    logger.log(&format!(
        "[login] {}: waiting for OAuth authorization to complete...",
        account.name
    ));
    let wait = Duration::from_millis(OAUTH_WAIT_MS);
    if wait_for_oauth_return(page, &account.domain, wait).await {
        logger.log(&format!(
            "[ok] {}: OAuth authorization complete, back on {}",
            account.name, account.domain
        ));
    } else {
        let current_url = page.current_url().await?;
        if on_provider_site(&current_url, provider) {
            // mid-authorization on the provider's own domain: give the
            // human a second window
            logger.log(&format!(
                "[wait] {}: complete the authorization in the browser ({}s timeout)...",
                account.name,
                OAUTH_WAIT_MS / 1000
            ));
            if wait_for_oauth_return(page, &account.domain, wait).await {
                logger.log(&format!("[ok] {}: OAuth authorization complete", account.name));
            } else {
                logger.log(&format!("[fail] {}: OAuth authorization timed out", account.name));
                return Ok(BrowserResult::fail_with(
                    SigninError::Timeout("OAuth authorization timed out".to_string()),
                    Default::default(),
                    api_calls.snapshot(),
                ));
            }
        } else {
            logger.log(&format!(
                "[warn] {}: OAuth state uncertain, current URL: {}",
                account.name, current_url
            ));
        }
    }

    logger.log(&format!(
        "[wait] {}: letting check-in logic run ({}s)...",
        account.name,
        SIGNIN_TRIGGER_WAIT_MS / 1000
    ));
    tokio::time::sleep(Duration::from_millis(SIGNIN_TRIGGER_WAIT_MS)).await;

    let calls = api_calls.snapshot();
    if calls.iter().any(|c| c.to_lowercase().contains("oauth")) {
        logger.log(&format!(
            "[key] {}: OAuth callback request observed (check-in triggered)",
            account.name
        ));
    }
    if !calls.is_empty() {
        logger.log(&format!(
            "[info] {}: captured {} API calls",
            account.name,
            calls.len()
        ));
    }

    logger.log(&format!("[ok] {}: OAuth sign-in flow complete", account.name));
    Ok(BrowserResult::ok(Default::default(), calls))
}

/// Wait until the page is back on the target domain and off the login
/// path. False on timeout.
async fn wait_for_oauth_return(page: &dyn PageDriver, domain: &str, timeout: Duration) -> bool {
    let origin = domain.trim_end_matches('/');
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(url) = page.current_url().await {
            if url.starts_with(origin) && !url.to_lowercase().contains("/login") {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(RETURN_POLL_MS)).await;
    }
}

/// Is the browser parked on the OAuth provider's own site?
fn on_provider_site(url: &str, provider: OauthProvider) -> bool {
    let url = url.to_lowercase();
    url.contains(provider.as_str()) || url.contains("github.com") || url.contains("google.com")
}
