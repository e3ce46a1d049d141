//! WAF check-in automation
//!
//! Obtains anti-bot ("WAF") clearance cookies for a target service and
//! triggers its check-in logic through one of four interchangeable
//! sign-in strategies: cookie replay, credential login, OAuth via an
//! already-authenticated browser, or a browser-less HTTP replay.

pub mod browser;
pub mod cache;
pub mod config;
pub mod mask;
pub mod signin;

use std::path::PathBuf;

pub use cache::WafCookieCache;
pub use signin::{run_signin, Account, BrowserResult, OauthProvider, SigninMethod};

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("waf-checkin").join("logs"))
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
/// Used to keep error messages and response previews bounded in logs and results.
pub fn safe_truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

/// Initialize logging (console layer plus daily-rolling file layer)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "waf-checkin.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
