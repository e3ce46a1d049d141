//! Account and result types shared by all sign-in strategies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::safe_truncate;

/// Maximum length of an error message stored in a result.
const ERROR_PREVIEW_CHARS: usize = 100;

/// Outcome of one sign-in invocation, uniform across strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserResult {
    pub success: bool,
    pub waf_cookies: HashMap<String, String>,
    pub api_calls: Vec<String>,
    pub error: Option<String>,
}

impl BrowserResult {
    /// Successful result carrying whatever cookies and API calls were captured.
    pub fn ok(waf_cookies: HashMap<String, String>, api_calls: Vec<String>) -> Self {
        Self {
            success: true,
            waf_cookies,
            api_calls,
            error: None,
        }
    }

    /// Failed result. The error message is truncated to keep logs and
    /// downstream storage bounded.
    pub fn fail(error: impl fmt::Display, api_calls: Vec<String>) -> Self {
        Self::fail_with(error, HashMap::new(), api_calls)
    }

    /// Failed result that still carries the cookies captured before the
    /// failure, for diagnosis by the caller.
    pub fn fail_with(
        error: impl fmt::Display,
        waf_cookies: HashMap<String, String>,
        api_calls: Vec<String>,
    ) -> Self {
        Self {
            success: false,
            waf_cookies,
            api_calls,
            error: Some(safe_truncate(&error.to_string(), ERROR_PREVIEW_CHARS)),
        }
    }
}

/// Target account description supplied by the caller. Read-only input;
/// never persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Display label used in log lines
    pub name: String,
    /// Target origin, e.g. "https://example.org"
    pub domain: String,
    /// Login page URL
    pub login_url: String,
    /// WAF cookie names that must be present for clearance
    pub required_cookies: Vec<String>,
    /// API user identifier sent on the identity endpoint call
    pub api_user: String,
    /// Header name carrying the API user identifier
    #[serde(default = "default_api_user_key")]
    pub api_user_key: String,
}

fn default_api_user_key() -> String {
    "new-api-user".to_string()
}

/// OAuth providers the sign-in page may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OauthProvider {
    Github,
    Google,
    LinuxDo,
}

impl OauthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OauthProvider::Github => "github",
            OauthProvider::Google => "google",
            OauthProvider::LinuxDo => "linuxdo",
        }
    }
}

impl fmt::Display for OauthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy selection plus its credentials.
#[derive(Debug, Clone)]
pub enum SigninMethod {
    /// Replay a trusted session cookie through a stealth browser.
    CookieReplay { session: String },
    /// Drive the login form with username and password.
    CredentialLogin { username: String, password: String },
    /// Click through an OAuth provider in an already-authenticated browser.
    OauthBrowser { provider: OauthProvider },
    /// Browser-less HTTP replay with pre-seeded cookies.
    HttpReplay { cookies: HashMap<String, String> },
}

/// Append-only, ordered log of observed API requests, scoped to one
/// session. Cloning shares the underlying log.
#[derive(Clone, Default)]
pub struct ApiCallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl ApiCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: String) {
        self.calls.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Snapshot of the log in observation order.
    pub fn snapshot(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

/// Optional caller-supplied sink for human-readable progress lines.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Progress logger: forwards to the caller's sink when present,
/// otherwise to the default tracing destination.
#[derive(Clone)]
pub struct Logger {
    sink: Option<LogSink>,
}

impl Logger {
    pub fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, msg: &str) {
        match &self.sink {
            Some(sink) => sink(msg),
            None => tracing::info!("{}", msg),
        }
    }
}
