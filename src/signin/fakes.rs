//! Scripted fakes for exercising sign-in flows without a browser.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::browser::{Locator, PageDriver};
use crate::signin::{ApiCallLog, Logger, SigninError, SigninSession};

/// Step at which a [`FakePage`] raises an injected fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultStep {
    Goto,
    ReadCookies,
    ClearCookies,
    SetSessionCookie,
    PressEnter,
    Evaluate,
}

/// Scripted page: a DOM described by locator strings, a cookie jar, and
/// queued evaluate results. Optionally fails at one chosen step.
#[derive(Default)]
pub(crate) struct FakePage {
    current_url: Mutex<String>,
    redirects: Mutex<HashMap<String, String>>,
    jar: Mutex<HashMap<String, String>>,
    present: Mutex<Vec<String>>,
    eval_results: Mutex<VecDeque<serde_json::Value>>,
    click_navigates_to: Mutex<Option<String>>,
    fail_at: Mutex<Option<FaultStep>>,
    pub filled: Mutex<Vec<(String, String)>>,
    pub clicked: Mutex<Vec<String>>,
    pub recording: AtomicBool,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_cookie(self: Arc<Self>, name: &str, value: &str) -> Arc<Self> {
        self.jar.lock().insert(name.to_string(), value.to_string());
        self
    }

    /// Mark a locator as matching the fake DOM.
    pub fn mark_present(self: Arc<Self>, locator: &Locator) -> Arc<Self> {
        self.present.lock().push(locator.to_string());
        self
    }

    /// Queue the result of the next `evaluate` call.
    pub fn push_eval(self: Arc<Self>, value: serde_json::Value) -> Arc<Self> {
        self.eval_results.lock().push_back(value);
        self
    }

    /// Navigating to `from` lands on `to` (server-side redirect).
    pub fn redirect(self: Arc<Self>, from: &str, to: &str) -> Arc<Self> {
        self.redirects.lock().insert(from.to_string(), to.to_string());
        self
    }

    /// A successful click navigates to `url` (e.g. an OAuth round trip).
    pub fn click_navigates_to(self: Arc<Self>, url: &str) -> Arc<Self> {
        *self.click_navigates_to.lock() = Some(url.to_string());
        self
    }

    pub fn fail_at(self: Arc<Self>, step: FaultStep) -> Arc<Self> {
        *self.fail_at.lock() = Some(step);
        self
    }

    pub fn url(&self) -> String {
        self.current_url.lock().clone()
    }

    pub fn jar_snapshot(&self) -> HashMap<String, String> {
        self.jar.lock().clone()
    }

    fn fault(&self, step: FaultStep) -> Result<(), SigninError> {
        if *self.fail_at.lock() == Some(step) {
            return Err(SigninError::ScriptError(format!("injected fault at {:?}", step)));
        }
        Ok(())
    }

    fn matches(&self, locator: &Locator) -> bool {
        self.present.lock().iter().any(|p| p == &locator.to_string())
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<(), SigninError> {
        self.fault(FaultStep::Goto)?;
        let landed = self
            .redirects
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        *self.current_url.lock() = landed;
        Ok(())
    }

    async fn wait_for_load(&self, _timeout: Duration) {}

    async fn current_url(&self) -> Result<String, SigninError> {
        Ok(self.url())
    }

    async fn cookies(&self) -> Result<HashMap<String, String>, SigninError> {
        self.fault(FaultStep::ReadCookies)?;
        Ok(self.jar_snapshot())
    }

    async fn clear_cookies(&self) -> Result<(), SigninError> {
        self.fault(FaultStep::ClearCookies)?;
        self.jar.lock().clear();
        Ok(())
    }

    async fn set_session_cookie(&self, _domain: &str, value: &str) -> Result<(), SigninError> {
        self.fault(FaultStep::SetSessionCookie)?;
        self.jar
            .lock()
            .insert(crate::config::SESSION_COOKIE_NAME.to_string(), value.to_string());
        Ok(())
    }

    async fn try_fill(&self, locator: &Locator, text: &str) -> bool {
        if self.matches(locator) {
            self.filled.lock().push((locator.to_string(), text.to_string()));
            true
        } else {
            false
        }
    }

    async fn try_click(&self, locator: &Locator) -> bool {
        if self.matches(locator) {
            self.clicked.lock().push(locator.to_string());
            if let Some(url) = self.click_navigates_to.lock().clone() {
                *self.current_url.lock() = url;
            }
            true
        } else {
            false
        }
    }

    async fn press_enter(&self) -> Result<(), SigninError> {
        self.fault(FaultStep::PressEnter)?;
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, SigninError> {
        self.fault(FaultStep::Evaluate)?;
        Ok(self
            .eval_results
            .lock()
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for(&self, locator: &Locator, _timeout: Duration) -> bool {
        self.matches(locator)
    }

    async fn wait_for_url_contains(&self, needle: &str, _timeout: Duration) -> bool {
        self.url().contains(needle)
    }

    async fn record_api_calls(&self, _log: &ApiCallLog, _logger: &Logger) {
        self.recording.store(true, Ordering::SeqCst);
    }
}

/// Session wrapper counting teardowns.
pub(crate) struct FakeSession {
    page: Arc<FakePage>,
    pub teardowns: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            teardowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SigninSession for FakeSession {
    fn page(&self) -> Arc<dyn PageDriver> {
        self.page.clone()
    }

    async fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}
