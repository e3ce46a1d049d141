//! Sign-in error types

use thiserror::Error;

/// Errors raised inside a sign-in flow. These never escape a strategy
/// entry point: every variant is folded into a failed [`BrowserResult`]
/// after the session teardown has run.
///
/// [`BrowserResult`]: super::BrowserResult
#[derive(Error, Debug)]
pub enum SigninError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript error: {0}")]
    ScriptError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("missing WAF cookies: {0:?}")]
    MissingWafCookies(Vec<String>),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("login rejected: {0}")]
    AuthRejected(String),

    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SigninError> for String {
    fn from(err: SigninError) -> String {
        err.to_string()
    }
}
