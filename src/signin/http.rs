//! Browser-less HTTP check-in replay.
//!
//! The target credits the check-in when an authenticated visit hits the
//! login page: a valid session gets redirected off it, and the redirect
//! fires the server-side logic. This strategy replays that with a plain
//! HTTP client, suited to environments without a browser.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::cookie_host;
use crate::config::{RunnerConfig, CHROME_USER_AGENT};
use crate::signin::{Account, ApiCallLog, BrowserResult, Logger, SigninError};

/// Final state of one GET after redirects.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub final_url: String,
    pub status: u16,
}

/// HTTP transport seam; injectable so the strategy can be exercised
/// against a fake.
#[async_trait]
pub trait CheckinTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpReply, SigninError>;
}

/// Production transport: cookie jar seeded with the caller's cookies,
/// redirects followed, TLS verification on. HTTP/2 is negotiated via
/// ALPN when the server offers it.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(
        domain: &str,
        cookies: &HashMap<String, String>,
        timeout_secs: u64,
    ) -> Result<Self, SigninError> {
        let base = reqwest::Url::parse(domain)
            .map_err(|e| SigninError::Transport(format!("invalid domain {}: {}", domain, e)))?;
        let host = cookie_host(domain);

        let jar = reqwest::cookie::Jar::default();
        for (name, value) in cookies {
            jar.add_cookie_str(&format!("{}={}; Domain={}", name, value, host), &base);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(CHROME_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SigninError::Transport(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl CheckinTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpReply, SigninError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SigninError::Transport(e.to_string()))?;

        Ok(HttpReply {
            final_url: response.url().to_string(),
            status: response.status().as_u16(),
        })
    }
}

pub async fn run(
    account: &Account,
    cookies: &HashMap<String, String>,
    config: &RunnerConfig,
    logger: &Logger,
) -> BrowserResult {
    logger.log(&format!(
        "[http] {}",
        crate::mask::mask_account_for_log(&account.name, "http", &account.api_user, Some(cookies))
    ));

    let transport = match ReqwestTransport::new(&account.domain, cookies, config.http_timeout_secs)
    {
        Ok(transport) => transport,
        Err(e) => {
            logger.log(&format!("[fail] {}: HTTP client setup failed: {}", account.name, e));
            return BrowserResult::fail(e, vec![]);
        }
    };

    // the client owns no external resources beyond its pool; dropping it
    // at the end of this call releases everything
    match flow(&transport, account, logger).await {
        Ok(result) => result,
        Err(e) => {
            logger.log(&format!("[fail] {}: HTTP request failed: {}", account.name, e));
            BrowserResult::fail(e, vec![])
        }
    }
}

pub(crate) async fn flow(
    transport: &dyn CheckinTransport,
    account: &Account,
    logger: &Logger,
) -> Result<BrowserResult, SigninError> {
    logger.log(&format!(
        "[http] {}: triggering check-in over plain HTTP...",
        account.name
    ));

    let api_calls = ApiCallLog::new();
    let headers = browser_like_headers(account);

    logger.log(&format!(
        "[http] {}: visiting login page {}",
        account.name, account.login_url
    ));
    let reply = transport.get(&account.login_url, &headers).await?;
    api_calls.push(format!("GET {} -> {}", account.login_url, reply.status));

    // a valid session gets redirected off the login page
    if reply.final_url.to_lowercase().contains("/login") {
        logger.log(&format!(
            "[fail] {}: still on the login page, session likely expired",
            account.name
        ));
        return Ok(BrowserResult::fail_with(
            SigninError::SessionExpired,
            Default::default(),
            api_calls.snapshot(),
        ));
    }

    logger.log(&format!(
        "[ok] {}: authenticated, redirected to {}",
        account.name, reply.final_url
    ));
    logger.log(&format!(
        "[http] {}: check-in should have been triggered by the redirect",
        account.name
    ));

    // reinforce the trigger with the identity endpoint; its status does
    // not affect the outcome, the redirect already did the work
    let identity_url = format!(
        "{}/api/user/self",
        account.domain.trim_end_matches('/')
    );
    logger.log(&format!(
        "[http] {}: calling {} to confirm check-in",
        account.name, identity_url
    ));

    let mut api_headers = headers.clone();
    for header in api_headers.iter_mut() {
        if header.0 == "Accept" {
            header.1 = "application/json".to_string();
        }
    }

    let identity_reply = transport.get(&identity_url, &api_headers).await?;
    api_calls.push(format!("GET {} -> {}", identity_url, identity_reply.status));

    if identity_reply.status == 200 {
        logger.log(&format!("[ok] {}: /api/user/self call succeeded", account.name));
    } else {
        logger.log(&format!(
            "[warn] {}: /api/user/self returned {}",
            account.name, identity_reply.status
        ));
    }

    Ok(BrowserResult::ok(Default::default(), api_calls.snapshot()))
}

/// Headers a desktop Chrome would send on a top-level navigation, plus
/// the caller's API-user header.
fn browser_like_headers(account: &Account) -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_string(), CHROME_USER_AGENT.to_string()),
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        (
            "Accept-Language".to_string(),
            "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
        ),
        ("Connection".to_string(), "keep-alive".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        (account.api_user_key.clone(), account.api_user.clone()),
    ]
}
