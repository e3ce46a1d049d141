//! WAF cookie projection.
//!
//! The anti-bot edge layer issues clearance cookies that must be present
//! before the origin serves real content; these helpers read the current
//! jar and project out the caller's required subset.

use std::collections::HashMap;

use super::page::PageDriver;
use crate::signin::SigninError;

/// Project the required cookie names out of a full jar snapshot.
pub fn project_waf_cookies(
    all: &HashMap<String, String>,
    required: &[String],
) -> HashMap<String, String> {
    all.iter()
        .filter(|(name, _)| required.iter().any(|r| r == *name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Names from `required` absent from `found`.
pub fn missing_names(found: &HashMap<String, String>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !found.contains_key(*name))
        .cloned()
        .collect()
}

/// Read the page's cookie jar and project out the required WAF cookies.
pub async fn collect_waf_cookies(
    page: &dyn PageDriver,
    required: &[String],
) -> Result<HashMap<String, String>, SigninError> {
    let all = page.cookies().await?;
    Ok(project_waf_cookies(&all, required))
}
