//! Cookie-replay sign-in: harvest WAF clearance cookies, simulate a
//! logout, re-inject the trusted session cookie, and let the server-side
//! login-success logic fire the check-in.

use std::time::Duration;

use tracing::debug;

use crate::browser::{collect_waf_cookies, missing_names, PageDriver, StealthSession};
use crate::config::{
    RunnerConfig, COOKIE_SET_WAIT_MS, PAGE_LOAD_WAIT_MS, SIGNIN_TRIGGER_WAIT_MS,
};
use crate::signin::{conclude, Account, ApiCallLog, BrowserResult, Logger, SigninError};

pub async fn run(
    account: &Account,
    session_value: &str,
    config: &RunnerConfig,
    logger: &Logger,
) -> BrowserResult {
    logger.log(&format!(
        "[browser] {}: launching browser to replay session...",
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
    let outcome = flow(page.as_ref(), account, session_value, logger).await;
    conclude(session, outcome, logger, &account.name).await
}

pub(crate) async fn flow(
    page: &dyn PageDriver,
    account: &Account,
    session_value: &str,
    logger: &Logger,
) -> Result<BrowserResult, SigninError> {
    // visit the login page to pick up WAF clearance cookies
    logger.log(&format!(
        "[browser] {}: visiting login page for WAF cookies...",
        account.name
    ));
    page.goto(&account.login_url).await?;
    page.wait_for_load(Duration::from_millis(PAGE_LOAD_WAIT_MS))
        .await;

    let waf_cookies = collect_waf_cookies(page, &account.required_cookies).await?;
    let missing = missing_names(&waf_cookies, &account.required_cookies);
    if !missing.is_empty() {
        logger.log(&format!(
            "[fail] {}: missing WAF cookies: {:?}",
            account.name, missing
        ));
        return Ok(BrowserResult::fail(
            SigninError::MissingWafCookies(missing),
            vec![],
        ));
    }
    logger.log(&format!(
        "[ok] {}: captured {} WAF cookies",
        account.name,
        waf_cookies.len()
    ));

    let api_calls = ApiCallLog::new();
    page.record_api_calls(&api_calls, logger).await;

    // simulate a logout and let the clearing propagate
    logger.log(&format!(
        "[logout] {}: clearing all cookies (simulated logout)...",
        account.name
    ));
    page.clear_cookies().await?;
    tokio::time::sleep(Duration::from_millis(COOKIE_SET_WAIT_MS)).await;

    // re-set the session cookie (simulated re-login)
    logger.log(&format!(
        "[login] {}: re-setting session cookie {} (simulated re-login)...",
        account.name,
        crate::mask::mask_session(session_value)
    ));
    page.set_session_cookie(&account.domain, session_value)
        .await?;

    // the site credits the check-in when login succeeds on the home page
    let home_url = format!("{}/", account.domain.trim_end_matches('/'));
    logger.log(&format!(
        "[checkin] {}: visiting home page to trigger check-in ({})...",
        account.name, home_url
    ));
    page.goto(&home_url).await?;

    // proactively hit the identity endpoint; some deployments only credit
    // the check-in on this exact call
    logger.log(&format!(
        "[checkin] {}: calling /api/user/self to trigger check-in...",
        account.name
    ));
    match page.evaluate(&identity_fetch_script(account)).await {
        Ok(result) => {
            let succeeded = result
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if succeeded {
                logger.log(&format!("[ok] {}: /api/user/self call succeeded", account.name));
                api_calls.push(format!(
                    "GET {}/api/user/self (browser)",
                    account.domain.trim_end_matches('/')
                ));
            } else {
                logger.log(&format!(
                    "[warn] {}: /api/user/self call failed: {}",
                    account.name, result
                ));
            }
        }
        // not fatal: the home navigation alone usually triggers the check-in
        Err(e) => {
            logger.log(&format!(
                "[warn] {}: in-page API call failed: {}",
                account.name,
                crate::safe_truncate(&e.to_string(), 50)
            ));
        }
    }

    logger.log(&format!(
        "[wait] {}: letting check-in logic run ({}s)...",
        account.name,
        SIGNIN_TRIGGER_WAIT_MS / 1000
    ));
    tokio::time::sleep(Duration::from_millis(SIGNIN_TRIGGER_WAIT_MS)).await;

    summarize_api_calls(&api_calls, account, logger);
    logger.log(&format!(
        "[ok] {}: logout/re-login flow complete",
        account.name
    ));

    Ok(BrowserResult::ok(waf_cookies, api_calls.snapshot()))
}

/// In-page fetch of the identity endpoint, carrying the caller's API-user
/// header so the server attributes the call.
fn identity_fetch_script(account: &Account) -> String {
    format!(
        r#"
        (async () => {{
            try {{
                const response = await fetch('/api/user/self', {{
                    method: 'GET',
                    credentials: 'include',
                    headers: {{
                        'Accept': 'application/json',
                        'Content-Type': 'application/json',
                        {header}: {value}
                    }}
                }});
                const data = await response.json();
                return {{ success: response.ok, status: response.status, data: data }};
            }} catch (e) {{
                return {{ success: false, error: e.message }};
            }}
        }})()
        "#,
        header = js_quote(&account.api_user_key),
        value = js_quote(&account.api_user),
    )
}

fn js_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn summarize_api_calls(api_calls: &ApiCallLog, account: &Account, logger: &Logger) {
    let calls = api_calls.snapshot();
    if calls.is_empty() {
        logger.log(&format!("[warn] {}: no API calls captured", account.name));
        return;
    }
    logger.log(&format!(
        "[info] {}: captured {} API calls",
        account.name,
        calls.len()
    ));
    for call in &calls {
        if call.contains("user/self") {
            debug!("{}: identity endpoint call observed: {}", account.name, call);
            logger.log(&format!(
                "[key] {}: /api/user/self call detected",
                account.name
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signin::fakes::{FakePage, FakeSession, FaultStep};
    use serde_json::json;

    fn account() -> Account {
        Account {
            name: "tester".to_string(),
            domain: "https://example.org".to_string(),
            login_url: "https://example.org/login".to_string(),
            required_cookies: vec!["waf_a".to_string(), "waf_b".to_string()],
            api_user: "42".to_string(),
            api_user_key: "new-api-user".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_succeeds_with_complete_cookies() {
        let page = FakePage::new()
            .with_cookie("waf_a", "1")
            .with_cookie("waf_b", "2")
            .with_cookie("unrelated", "x")
            .push_eval(json!({ "success": true, "status": 200 }));
        let logger = Logger::new(None);

        let result = flow(page.as_ref(), &account(), "sess-value", &logger)
            .await
            .unwrap();

        assert!(result.success);
        // exactly the required names, nothing extra
        assert_eq!(result.waf_cookies.len(), 2);
        assert_eq!(result.waf_cookies["waf_a"], "1");
        assert_eq!(result.waf_cookies["waf_b"], "2");
        assert!(result
            .api_calls
            .iter()
            .any(|c| c.contains("/api/user/self")));
        // session cookie was re-injected after the jar was cleared
        assert_eq!(page.jar_snapshot()["session"], "sess-value");
        // the request recorder was attached
        assert!(page.recording.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flow_fails_on_missing_waf_cookie() {
        let page = FakePage::new().with_cookie("waf_a", "1");
        let logger = Logger::new(None);

        let result = flow(page.as_ref(), &account(), "sess-value", &logger)
            .await
            .unwrap();

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("missing WAF cookies"));
        assert!(error.contains("waf_b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_identity_fetch_is_not_fatal() {
        let page = FakePage::new()
            .with_cookie("waf_a", "1")
            .with_cookie("waf_b", "2")
            .push_eval(json!({ "success": false, "error": "network down" }));
        let logger = Logger::new(None);

        let result = flow(page.as_ref(), &account(), "sess-value", &logger)
            .await
            .unwrap();

        assert!(result.success);
        assert!(!result
            .api_calls
            .iter()
            .any(|c| c.contains("(browser)")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_thrown_identity_fetch_is_not_fatal() {
        let page = FakePage::new()
            .with_cookie("waf_a", "1")
            .with_cookie("waf_b", "2")
            .fail_at(FaultStep::Evaluate);
        let logger = Logger::new(None);

        let result = flow(page.as_ref(), &account(), "sess-value", &logger)
            .await
            .unwrap();

        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_runs_once_whatever_step_faults() {
        for step in [
            FaultStep::Goto,
            FaultStep::ReadCookies,
            FaultStep::ClearCookies,
            FaultStep::SetSessionCookie,
        ] {
            let page = FakePage::new()
                .with_cookie("waf_a", "1")
                .with_cookie("waf_b", "2")
                .fail_at(step);
            let logger = Logger::new(None);

            let outcome = flow(page.as_ref(), &account(), "sess-value", &logger).await;
            assert!(outcome.is_err(), "expected fault at {:?}", step);

            let session = FakeSession::new(page.clone());
            let teardowns = session.teardowns.clone();
            let result = conclude(session, outcome, &logger, "tester").await;

            assert!(!result.success);
            assert_eq!(teardowns.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }
}
