//! Credential sign-in: drive the login form with username and password.
//!
//! Suited to deployments that credit the check-in when a real login
//! completes. Form controls are located through the ordered heuristic
//! tables in [`selectors`](super::selectors).

use std::time::Duration;

use crate::browser::{collect_waf_cookies, PageDriver, StealthSession};
use crate::config::{
    RunnerConfig, LOGIN_NAV_TIMEOUT_MS, PAGE_LOAD_WAIT_MS, SELECTOR_WAIT_MS,
    SIGNIN_TRIGGER_WAIT_MS,
};
use crate::signin::selectors::{
    LOGIN_FORM_HINT, PASSWORD_LOCATORS, SUBMIT_LOCATORS, USERNAME_LOCATORS,
};
use crate::signin::{
    click_first, conclude, fill_first, Account, ApiCallLog, BrowserResult, Logger, SigninError,
};

/// Scrape a visible error message from the login page.
const ERROR_SCRAPE_SCRIPT: &str = r#"
    (() => {
        const errorEl = document.querySelector('.error, .alert-error, .message-error, [class*="error"]');
        return errorEl ? errorEl.textContent.trim() : null;
    })()
"#;

pub async fn run(
    account: &Account,
    username: &str,
    password: &str,
    config: &RunnerConfig,
    logger: &Logger,
) -> BrowserResult {
    logger.log(&format!(
        "[browser] {}: launching browser for credential login...",
        account.name
    ));

    let session = match StealthSession::launch(config).await {
        Ok(session) => session,
        Err(e) => {
            logger.log(&format!("[fail] {}: browser launch failed: {}", account.name, e));
            return BrowserResult::fail(e, vec![]);
        }
    };

    let page = session.page();
    let outcome = flow(page.as_ref(), account, username, password, logger).await;
    conclude(session, outcome, logger, &account.name).await
}

pub(crate) async fn flow(
    page: &dyn PageDriver,
    account: &Account,
    username: &str,
    password: &str,
    logger: &Logger,
) -> Result<BrowserResult, SigninError> {
    let api_calls = ApiCallLog::new();
    page.record_api_calls(&api_calls, logger).await;

    logger.log(&format!("[browser] {}: visiting login page...", account.name));
    page.goto(&account.login_url).await?;
    page.wait_for_load(Duration::from_millis(PAGE_LOAD_WAIT_MS))
        .await;

    // harvest whatever clearance cookies the edge layer issued; the login
    // itself is the operation here, so completeness is not enforced
    let waf_cookies = collect_waf_cookies(page, &account.required_cookies).await?;
    if !waf_cookies.is_empty() {
        logger.log(&format!(
            "[ok] {}: captured {} WAF cookies",
            account.name,
            waf_cookies.len()
        ));
    }

    logger.log(&format!("[login] {}: filling login form...", account.name));
    if !page
        .wait_for(&LOGIN_FORM_HINT, Duration::from_millis(SELECTOR_WAIT_MS))
        .await
    {
        logger.log(&format!(
            "[warn] {}: login form not detected, trying to continue...",
            account.name
        ));
    }

    if !fill_first(page, USERNAME_LOCATORS, username).await {
        logger.log(&format!("[fail] {}: username field not found", account.name));
        return Ok(BrowserResult::fail_with(
            SigninError::ElementNotFound("username field".to_string()),
            waf_cookies,
            api_calls.snapshot(),
        ));
    }
    logger.log(&format!("[login] {}: username filled", account.name));

    if !fill_first(page, PASSWORD_LOCATORS, password).await {
        logger.log(&format!("[fail] {}: password field not found", account.name));
        return Ok(BrowserResult::fail_with(
            SigninError::ElementNotFound("password field".to_string()),
            waf_cookies,
            api_calls.snapshot(),
        ));
    }
    logger.log(&format!("[login] {}: password filled", account.name));

    logger.log(&format!("[login] {}: submitting login form...", account.name));
    if click_first(page, SUBMIT_LOCATORS).await {
        logger.log(&format!("[login] {}: submit control clicked", account.name));
    } else {
        logger.log(&format!(
            "[login] {}: no submit control found, pressing Enter...",
            account.name
        ));
        page.press_enter().await?;
    }

    logger.log(&format!("[login] {}: waiting for login to complete...", account.name));
    if page
        .wait_for_url_contains("/console", Duration::from_millis(LOGIN_NAV_TIMEOUT_MS))
        .await
    {
        logger.log(&format!(
            "[ok] {}: login succeeded, console reached",
            account.name
        ));
    } else {
        let current_url = page.current_url().await?;
        if current_url.to_lowercase().contains("login") {
            // still on the login page; look for a visible rejection message
            if let Ok(serde_json::Value::String(error_text)) =
                page.evaluate(ERROR_SCRAPE_SCRIPT).await
            {
                let error_text = error_text.trim();
                if !error_text.is_empty() {
                    logger.log(&format!(
                        "[fail] {}: login rejected - {}",
                        account.name,
                        crate::safe_truncate(error_text, 50)
                    ));
                    return Ok(BrowserResult::fail_with(
                        SigninError::AuthRejected(crate::safe_truncate(error_text, 50)),
                        waf_cookies,
                        api_calls.snapshot(),
                    ));
                }
            }
        }
        logger.log(&format!(
            "[warn] {}: login state uncertain, current URL: {}",
            account.name, current_url
        ));
    }

    logger.log(&format!(
        "[wait] {}: letting check-in logic run ({}s)...",
        account.name,
        SIGNIN_TRIGGER_WAIT_MS / 1000
    ));
    tokio::time::sleep(Duration::from_millis(SIGNIN_TRIGGER_WAIT_MS)).await;

    let calls = api_calls.snapshot();
    if !calls.is_empty() {
        logger.log(&format!(
            "[info] {}: captured {} API calls",
            account.name,
            calls.len()
        ));
        for call in &calls {
            if call.contains("user/self") {
                logger.log(&format!(
                    "[key] {}: /api/user/self call detected (check-in trigger)",
                    account.name
                ));
            }
        }
    }

    logger.log(&format!("[ok] {}: credential login flow complete", account.name));
    Ok(BrowserResult::ok(waf_cookies, calls))
}
