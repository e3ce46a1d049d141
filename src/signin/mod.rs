//! Sign-in strategies.
//!
//! Four interchangeable flows share one contract: account description in,
//! [`BrowserResult`] out, with the underlying browser or HTTP resources
//! fully released on every exit path. Selection is explicit through
//! [`SigninMethod`].

mod cookie_replay;
mod credential;
mod errors;
mod http;
mod oauth;
pub mod selectors;
mod types;

#[cfg(test)]
pub(crate) mod fakes;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub use errors::SigninError;
pub use http::{CheckinTransport, HttpReply, ReqwestTransport};
pub use oauth::OauthSession;
pub use types::{
    Account, ApiCallLog, BrowserResult, LogSink, Logger, OauthProvider, SigninMethod,
};

use crate::browser::{Locator, PageDriver, StealthSession};
use crate::config::RunnerConfig;

/// A live browser session a strategy runs against. The teardown must be
/// invoked exactly once per acquisition, on every exit path.
#[async_trait]
pub trait SigninSession: Send {
    fn page(&self) -> Arc<dyn PageDriver>;
    async fn teardown(&mut self);
}

#[async_trait]
impl SigninSession for StealthSession {
    fn page(&self) -> Arc<dyn PageDriver> {
        StealthSession::page(self)
    }

    async fn teardown(&mut self) {
        StealthSession::teardown(self).await;
    }
}

/// Release the session and fold the flow outcome into a uniform result.
/// The teardown runs unconditionally, whichever branch produced the
/// outcome.
pub(crate) async fn conclude<S: SigninSession>(
    mut session: S,
    outcome: Result<BrowserResult, SigninError>,
    logger: &Logger,
    label: &str,
) -> BrowserResult {
    session.teardown().await;

    match outcome {
        Ok(result) => result,
        Err(e) => {
            logger.log(&format!("[fail] {}: browser operation failed: {}", label, e));
            BrowserResult::fail(e, vec![])
        }
    }
}

/// Try to fill through an ordered heuristic list; first match wins.
pub(crate) async fn fill_first(page: &dyn PageDriver, locators: &[Locator], text: &str) -> bool {
    for locator in locators {
        if page.try_fill(locator, text).await {
            debug!("Filled element via {}", locator);
            return true;
        }
    }
    false
}

/// Try to click through an ordered heuristic list; first match wins.
pub(crate) async fn click_first(page: &dyn PageDriver, locators: &[Locator]) -> bool {
    for locator in locators {
        if page.try_click(locator).await {
            debug!("Clicked element via {}", locator);
            return true;
        }
    }
    false
}

/// Run one sign-in strategy to completion and return its result. Never
/// raises: internal faults come back as a failed [`BrowserResult`] after
/// the session cleanup has run.
pub async fn run_signin(
    account: &Account,
    method: &SigninMethod,
    config: &RunnerConfig,
    log_fn: Option<LogSink>,
) -> BrowserResult {
    let logger = Logger::new(log_fn);

    match method {
        SigninMethod::CookieReplay { session } => {
            cookie_replay::run(account, session, config, &logger).await
        }
        SigninMethod::CredentialLogin { username, password } => {
            credential::run(account, username, password, config, &logger).await
        }
        SigninMethod::OauthBrowser { provider } => {
            oauth::run(account, *provider, config, &logger).await
        }
        SigninMethod::HttpReplay { cookies } => {
            http::run(account, cookies, config, &logger).await
        }
    }
}
