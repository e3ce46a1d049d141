//! Process-wide WAF cookie cache.
//!
//! Clearance cookies are expensive to obtain (a full stealth browser
//! launch), so successful extractions are cached per domain. The whole
//! check-then-populate sequence runs under one lock: two concurrent
//! callers for the same domain never both launch a browser. Cross-domain
//! callers also serialize on that lock; acceptable for an
//! at-most-one-population guarantee this simple.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::browser::{collect_waf_cookies, missing_names, PageDriver, StealthSession};
use crate::config::{RunnerConfig, PAGE_LOAD_WAIT_MS};
use crate::signin::{Logger, SigninError};

/// Source of clearance cookies for a domain. Injectable so the cache can
/// be exercised without a browser.
#[async_trait]
pub trait ClearanceProbe: Send + Sync {
    async fn obtain(
        &self,
        domain: &str,
        login_url: &str,
        required: &[String],
        logger: &Logger,
    ) -> Result<HashMap<String, String>, SigninError>;
}

/// Default probe: launch a stealth session, navigate to the login page,
/// wait for load completion, read the jar, tear the session down.
pub struct BrowserProbe {
    config: RunnerConfig,
}

impl BrowserProbe {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClearanceProbe for BrowserProbe {
    async fn obtain(
        &self,
        _domain: &str,
        login_url: &str,
        required: &[String],
        _logger: &Logger,
    ) -> Result<HashMap<String, String>, SigninError> {
        let mut session = StealthSession::launch(&self.config).await?;
        let page = session.page();

        let outcome = async {
            page.goto(login_url).await?;
            page.wait_for_load(Duration::from_millis(PAGE_LOAD_WAIT_MS))
                .await;
            collect_waf_cookies(page.as_ref(), required).await
        }
        .await;

        session.teardown().await;
        outcome
    }
}

/// Domain-keyed store of previously obtained clearance cookies.
/// Constructed once per process and passed by reference to callers.
pub struct WafCookieCache {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
    probe: Arc<dyn ClearanceProbe>,
}

impl WafCookieCache {
    pub fn new(probe: Arc<dyn ClearanceProbe>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            probe,
        }
    }

    /// Cache backed by real browser extraction.
    pub fn with_browser_probe(config: RunnerConfig) -> Self {
        Self::new(Arc::new(BrowserProbe::new(config)))
    }

    /// Cached entry for `domain`, only if it covers every required name.
    pub async fn get_cached(
        &self,
        domain: &str,
        required: &[String],
    ) -> Option<HashMap<String, String>> {
        let entries = self.entries.lock().await;
        entries
            .get(domain)
            .filter(|cached| missing_names(cached, required).is_empty())
            .cloned()
    }

    /// Return the cached entry for `domain`, or perform the full
    /// browser-based extraction and cache the result. Stores and returns
    /// only complete cookie sets; an incomplete extraction yields `None`
    /// and leaves the cache untouched.
    pub async fn fetch_or_populate(
        &self,
        domain: &str,
        login_url: &str,
        required: &[String],
        logger: &Logger,
    ) -> Option<HashMap<String, String>> {
        // One critical section covers the check and the populate, so a
        // concurrent caller for the same domain waits here instead of
        // launching a second browser.
        let mut entries = self.entries.lock().await;

        if let Some(cached) = entries.get(domain) {
            if missing_names(cached, required).is_empty() {
                logger.log(&format!("[cache] using cached WAF cookies ({})", domain));
                return Some(cached.clone());
            }
        }

        logger.log(&format!("[browser] obtaining WAF cookies ({})...", domain));

        let waf_cookies = match self.probe.obtain(domain, login_url, required, logger).await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("WAF cookie extraction failed for {}: {}", domain, e);
                return None;
            }
        };

        if !waf_cookies.is_empty() && missing_names(&waf_cookies, required).is_empty() {
            entries.insert(domain.to_string(), waf_cookies.clone());
            logger.log(&format!("[cache] WAF cookies cached ({})", domain));
            return Some(waf_cookies);
        }

        None
    }

    /// Empty the entire cache, all domains, immediately.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
        yields: HashMap<String, String>,
    }

    impl CountingProbe {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                yields: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClearanceProbe for CountingProbe {
        async fn obtain(
            &self,
            _domain: &str,
            _login_url: &str,
            _required: &[String],
            _logger: &Logger,
        ) -> Result<HashMap<String, String>, SigninError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.yields.clone())
        }
    }

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_concurrent_fetch_populates_once() {
        let probe = CountingProbe::new(&[("waf_a", "1"), ("waf_b", "2")]);
        let cache = WafCookieCache::new(probe.clone());
        let logger = Logger::new(None);
        let names = required(&["waf_a", "waf_b"]);

        let (a, b) = tokio::join!(
            cache.fetch_or_populate("example.org", "https://example.org/login", &names, &logger),
            cache.fetch_or_populate("example.org", "https://example.org/login", &names, &logger),
        );

        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_extraction_yields_none_and_no_cache_write() {
        let probe = CountingProbe::new(&[("waf_a", "x")]);
        let cache = WafCookieCache::new(probe.clone());
        let logger = Logger::new(None);
        let names = required(&["waf_a", "waf_b"]);

        let result = cache
            .fetch_or_populate("example.org", "https://example.org/login", &names, &logger)
            .await;
        assert!(result.is_none());
        assert!(cache.get_cached("example.org", &names).await.is_none());

        // a later caller probes again instead of seeing a partial entry
        let _ = cache
            .fetch_or_populate("example.org", "https://example.org/login", &names, &logger)
            .await;
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_empties_all_domains() {
        let probe = CountingProbe::new(&[("waf_a", "1")]);
        let cache = WafCookieCache::new(probe.clone());
        let logger = Logger::new(None);
        let names = required(&["waf_a"]);

        for domain in ["one.example", "two.example"] {
            let populated = cache
                .fetch_or_populate(domain, "https://example.org/login", &names, &logger)
                .await;
            assert!(populated.is_some());
        }
        assert_eq!(probe.calls(), 2);

        cache.clear().await;

        for domain in ["one.example", "two.example"] {
            assert!(cache.get_cached(domain, &names).await.is_none());
            let repopulated = cache
                .fetch_or_populate(domain, "https://example.org/login", &names, &logger)
                .await;
            assert!(repopulated.is_some());
        }
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test]
    async fn test_get_cached_misses_when_required_set_grows() {
        let probe = CountingProbe::new(&[("waf_a", "1")]);
        let cache = WafCookieCache::new(probe);
        let logger = Logger::new(None);

        let populated = cache
            .fetch_or_populate(
                "example.org",
                "https://example.org/login",
                &required(&["waf_a"]),
                &logger,
            )
            .await;
        assert!(populated.is_some());

        assert!(cache
            .get_cached("example.org", &required(&["waf_a"]))
            .await
            .is_some());
        assert!(cache
            .get_cached("example.org", &required(&["waf_a", "waf_b"]))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_populate_overwrites_stale_entry_wholesale() {
        let probe = CountingProbe::new(&[("waf_a", "new"), ("waf_b", "2")]);
        let cache = WafCookieCache::new(probe);
        let logger = Logger::new(None);

        // a stale entry that no longer covers the required set
        {
            let mut entries = cache.entries.lock().await;
            let mut stale = HashMap::new();
            stale.insert("waf_a".to_string(), "old".to_string());
            stale.insert("legacy".to_string(), "x".to_string());
            entries.insert("example.org".to_string(), stale);
        }

        let fresh = cache
            .fetch_or_populate(
                "example.org",
                "https://example.org/login",
                &required(&["waf_a", "waf_b"]),
                &logger,
            )
            .await
            .unwrap();

        // replaced wholesale, not merged: the legacy key is gone
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh["waf_a"], "new");
        let cached = cache
            .get_cached("example.org", &required(&["waf_a"]))
            .await
            .unwrap();
        assert!(!cached.contains_key("legacy"));
    }
}
