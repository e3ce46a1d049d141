//! Sensitive-value masking for log output.
//!
//! Raw values live only in memory and in the caller's storage; masking is
//! applied at the display layer. These helpers are for formatting log
//! lines only — never use their output as cache keys or for comparisons.

use std::collections::HashMap;

/// Mask a session cookie value, keeping three chars of each end.
pub fn mask_session(session: &str) -> String {
    if session.is_empty() {
        return String::new();
    }
    if session.chars().count() <= 6 {
        return "***".to_string();
    }
    let chars: Vec<char> = session.chars().collect();
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Mask a password entirely.
pub fn mask_password(password: &str) -> String {
    if password.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}

/// Mask a cookie map for display. Only the session cookie value is
/// sensitive; other cookie values (WAF clearance tokens) pass through.
pub fn mask_cookies(cookies: &HashMap<String, String>) -> HashMap<String, String> {
    cookies
        .iter()
        .map(|(k, v)| {
            if k == crate::config::SESSION_COOKIE_NAME {
                (k.clone(), mask_session(v))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

/// Masked one-line account summary for log output.
pub fn mask_account_for_log(
    name: &str,
    provider: &str,
    api_user: &str,
    cookies: Option<&HashMap<String, String>>,
) -> String {
    let display_name = if name.is_empty() {
        format!("Account ({})", api_user)
    } else {
        name.to_string()
    };

    if let Some(cookies) = cookies {
        let masked = mask_cookies(cookies);
        if let Some(session) = masked.get(crate::config::SESSION_COOKIE_NAME) {
            return format!("{} [{}] session={}", display_name, provider, session);
        }
    }
    format!("{} [{}]", display_name, provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_session_long() {
        assert_eq!(mask_session("abcdefghijklxyz"), "abc...xyz");
    }

    #[test]
    fn test_mask_session_short() {
        assert_eq!(mask_session("abc"), "***");
        assert_eq!(mask_session("abcdef"), "***");
    }

    #[test]
    fn test_mask_session_empty() {
        assert_eq!(mask_session(""), "");
    }

    #[test]
    fn test_mask_password() {
        assert_eq!(mask_password("hunter2"), "***");
        assert_eq!(mask_password(""), "");
    }

    #[test]
    fn test_mask_cookies_only_masks_session() {
        let mut cookies = HashMap::new();
        cookies.insert("session".to_string(), "secretsecretsecret".to_string());
        cookies.insert("waf_token".to_string(), "clearance".to_string());

        let masked = mask_cookies(&cookies);
        assert_eq!(masked["session"], "sec...ret");
        assert_eq!(masked["waf_token"], "clearance");
    }

    #[test]
    fn test_mask_account_for_log_fallback_name() {
        let line = mask_account_for_log("", "github", "42", None);
        assert_eq!(line, "Account (42) [github]");
    }

    #[test]
    fn test_mask_account_for_log_with_session() {
        let mut cookies = HashMap::new();
        cookies.insert("session".to_string(), "abcdefghijklxyz".to_string());
        let line = mask_account_for_log("alice", "github", "42", Some(&cookies));
        assert_eq!(line, "alice [github] session=abc...xyz");
    }
}
