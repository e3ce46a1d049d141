//! Page driver seam between the sign-in flows and the CDP page.
//!
//! Strategies are written against [`PageDriver`] so they can be exercised
//! with scripted fakes; [`CdpPage`] is the production implementation on
//! top of chromiumoxide.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, CookieSameSite,
};
use chromiumoxide::Page;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::SESSION_COOKIE_NAME;
use crate::signin::{ApiCallLog, Logger, SigninError};

/// Poll interval for soft waits (selector appearance, URL transitions).
const POLL_INTERVAL_MS: u64 = 500;

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// One element-location heuristic. Heuristic tables are ordered slices of
/// these, evaluated first-match-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector
    Css(&'static str),
    /// Elements of `tag` whose visible text contains `needle`
    Text {
        tag: &'static str,
        needle: &'static str,
    },
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css:{}", sel),
            Locator::Text { tag, needle } => write!(f, "text:{}:{}", tag, needle),
        }
    }
}

/// Async page operations the sign-in flows depend on.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), SigninError>;

    /// Wait for load completion; degrades to a fixed pause on timeout.
    async fn wait_for_load(&self, timeout: Duration);

    async fn current_url(&self) -> Result<String, SigninError>;

    /// Current cookie jar as name -> value.
    async fn cookies(&self) -> Result<HashMap<String, String>, SigninError>;

    async fn clear_cookies(&self) -> Result<(), SigninError>;

    /// Inject the application session cookie scoped to the target domain,
    /// marked HTTP-only, secure, SameSite=Lax.
    async fn set_session_cookie(&self, domain: &str, value: &str) -> Result<(), SigninError>;

    /// Fill the element located by `locator`. Returns false when no
    /// element matches; other failures are treated as a non-match so the
    /// caller can try the next heuristic.
    async fn try_fill(&self, locator: &Locator, text: &str) -> bool;

    /// Click the element located by `locator`; non-match semantics as
    /// for [`try_fill`](Self::try_fill).
    async fn try_click(&self, locator: &Locator) -> bool;

    /// Keyboard Enter, used as the form-submit fallback.
    async fn press_enter(&self) -> Result<(), SigninError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SigninError>;

    /// Soft-wait until `locator` matches; false on timeout.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> bool;

    /// Soft-wait until the page URL contains `needle`; false on timeout.
    async fn wait_for_url_contains(&self, needle: &str, timeout: Duration) -> bool;

    /// Start recording outgoing API requests into `log`.
    async fn record_api_calls(&self, log: &ApiCallLog, logger: &Logger);
}

/// Production [`PageDriver`] backed by a chromiumoxide page.
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Close the underlying page, ignoring failures.
    pub async fn close(&self) {
        let _ = self.page.clone().close().await;
    }

    async fn element_exists(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(sel) => self.page.find_element(*sel).await.is_ok(),
            Locator::Text { tag, needle } => {
                let script = format!(
                    r#"(function() {{
                        const els = Array.from(document.querySelectorAll({tag}));
                        return els.some(e => (e.textContent || '').includes({needle}));
                    }})()"#,
                    tag = js_string(tag),
                    needle = js_string(needle),
                );
                matches!(
                    self.page.evaluate(script).await.map(|r| r.value().cloned()),
                    Ok(Some(serde_json::Value::Bool(true)))
                )
            }
        }
    }
}

/// Quote a string for embedding into an evaluated script.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<(), SigninError> {
        debug!("Navigating to: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| SigninError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) {
        match tokio::time::timeout(
            timeout,
            self.page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state: {}", e);
                tokio::time::sleep(timeout).await;
            }
            Err(_) => {
                warn!("Timeout waiting for page ready state");
            }
        }
    }

    async fn current_url(&self) -> Result<String, SigninError> {
        self.page
            .url()
            .await
            .map_err(|e| SigninError::NavigationFailed(e.to_string()))?
            .ok_or_else(|| SigninError::NavigationFailed("no URL".into()))
    }

    async fn cookies(&self) -> Result<HashMap<String, String>, SigninError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| SigninError::ScriptError(e.to_string()))?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn clear_cookies(&self) -> Result<(), SigninError> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(|e| SigninError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn set_session_cookie(&self, domain: &str, value: &str) -> Result<(), SigninError> {
        let host = cookie_host(domain);
        let param = CookieParam::builder()
            .name(SESSION_COOKIE_NAME)
            .value(value)
            .domain(host)
            .path("/")
            .http_only(true)
            .secure(true)
            .same_site(CookieSameSite::Lax)
            .build()
            .map_err(SigninError::ScriptError)?;

        self.page
            .set_cookie(param)
            .await
            .map_err(|e| SigninError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn try_fill(&self, locator: &Locator, text: &str) -> bool {
        match locator {
            Locator::Css(sel) => {
                let element = match self.page.find_element(*sel).await {
                    Ok(el) => el,
                    Err(_) => return false,
                };
                let _ = element.click().await;
                element.type_str(text).await.is_ok()
            }
            Locator::Text { tag, needle } => {
                let script = format!(
                    r#"(function() {{
                        const els = Array.from(document.querySelectorAll({tag}));
                        const el = els.find(e => (e.textContent || '').includes({needle}));
                        if (!el) return false;
                        el.focus();
                        el.value = {text};
                        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                        return true;
                    }})()"#,
                    tag = js_string(tag),
                    needle = js_string(needle),
                    text = js_string(text),
                );
                matches!(
                    self.page.evaluate(script).await.map(|r| r.value().cloned()),
                    Ok(Some(serde_json::Value::Bool(true)))
                )
            }
        }
    }

    async fn try_click(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(sel) => {
                let element = match self.page.find_element(*sel).await {
                    Ok(el) => el,
                    Err(_) => return false,
                };
                element.click().await.is_ok()
            }
            Locator::Text { tag, needle } => {
                let script = format!(
                    r#"(function() {{
                        const els = Array.from(document.querySelectorAll({tag}));
                        const el = els.find(e => (e.textContent || '').includes({needle}));
                        if (!el) return false;
                        el.click();
                        return true;
                    }})()"#,
                    tag = js_string(tag),
                    needle = js_string(needle),
                );
                matches!(
                    self.page.evaluate(script).await.map(|r| r.value().cloned()),
                    Ok(Some(serde_json::Value::Bool(true)))
                )
            }
        }
    }

    async fn press_enter(&self) -> Result<(), SigninError> {
        // Brief pause before pressing, as a human would
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(100..300)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        // rawKeyDown Enter with full key properties for proper form submission
        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .map_err(SigninError::ScriptError)?;
        self.page
            .execute(key_down)
            .await
            .map_err(|e| SigninError::ScriptError(format!("CDP Enter keyDown failed: {}", e)))?;

        // char event with \r triggers form submission in most browsers
        let char_event = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .text("\r")
            .build()
            .map_err(SigninError::ScriptError)?;
        self.page
            .execute(char_event)
            .await
            .map_err(|e| SigninError::ScriptError(format!("CDP Enter char failed: {}", e)))?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .map_err(SigninError::ScriptError)?;
        self.page
            .execute(key_up)
            .await
            .map_err(|e| SigninError::ScriptError(format!("CDP Enter keyUp failed: {}", e)))?;

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SigninError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| SigninError::ScriptError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.element_exists(locator).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn wait_for_url_contains(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(url) = self.current_url().await {
                if url.contains(needle) {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn record_api_calls(&self, log: &ApiCallLog, logger: &Logger) {
        if let Err(e) =
            super::recorder::attach_api_recorder(self.page.clone(), log.clone(), logger.clone())
                .await
        {
            warn!("Could not attach API request recorder: {}", e);
        }
    }
}

/// Cookie domain for a target origin: the host part when the origin
/// parses as a URL, otherwise the origin stripped of its scheme.
pub(crate) fn cookie_host(domain: &str) -> String {
    url::Url::parse(domain)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| {
            domain
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_host_from_origin() {
        assert_eq!(cookie_host("https://example.org"), "example.org");
        assert_eq!(cookie_host("http://example.org/"), "example.org");
    }

    #[test]
    fn test_cookie_host_bare() {
        assert_eq!(cookie_host("example.org"), "example.org");
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::Css("input[name='q']").to_string(), "css:input[name='q']");
        let text = Locator::Text {
            tag: "button",
            needle: "GitHub",
        };
        assert_eq!(text.to_string(), "text:button:GitHub");
    }
}
