//! Element-location heuristic tables.
//!
//! The target site's DOM differs per deployment and sometimes per
//! session, so form and OAuth controls are located by ordered lists of
//! matcher descriptors, evaluated first-match-wins. This is data, not
//! control flow.

use crate::browser::Locator;
use crate::signin::OauthProvider;

/// Present when a login form has rendered; used for the initial
/// bounded wait before filling fields.
pub const LOGIN_FORM_HINT: Locator = Locator::Css(r#"input[name="username"], input[type="text"]"#);

/// Username/email field heuristics, most specific first.
pub const USERNAME_LOCATORS: &[Locator] = &[
    Locator::Css(r#"input[name="username"]"#),
    Locator::Css(r#"input[type="text"]:first-of-type"#),
    Locator::Css(r#"input[placeholder*="用户名"]"#),
    Locator::Css(r#"input[placeholder*="username"]"#),
    Locator::Css(r#"input[placeholder*="邮箱"]"#),
    Locator::Css(r#"input[placeholder*="email"]"#),
];

/// Password field heuristics.
pub const PASSWORD_LOCATORS: &[Locator] = &[
    Locator::Css(r#"input[name="password"]"#),
    Locator::Css(r#"input[type="password"]"#),
    Locator::Css(r#"input[placeholder*="密码"]"#),
    Locator::Css(r#"input[placeholder*="password"]"#),
];

/// Submit control heuristics; when none match, the flow falls back to a
/// keyboard Enter press.
pub const SUBMIT_LOCATORS: &[Locator] = &[
    Locator::Css(r#"button[type="submit"]"#),
    Locator::Text {
        tag: "button",
        needle: "登录",
    },
    Locator::Text {
        tag: "button",
        needle: "登 录",
    },
    Locator::Text {
        tag: "button",
        needle: "Login",
    },
    Locator::Css(r#"input[type="submit"]"#),
    Locator::Css(".login-button"),
    Locator::Css(".submit-button"),
];

const GITHUB_LOCATORS: &[Locator] = &[
    // text match
    Locator::Text {
        tag: "button",
        needle: "GitHub",
    },
    Locator::Text {
        tag: "a",
        needle: "GitHub",
    },
    Locator::Text {
        tag: "button",
        needle: "使用 GitHub 登录",
    },
    Locator::Text {
        tag: "button",
        needle: "Sign in with GitHub",
    },
    Locator::Text {
        tag: "a",
        needle: "Sign in with GitHub",
    },
    // class name match
    Locator::Css(r#"[class*="github"]"#),
    Locator::Css(r#"[class*="Github"]"#),
    // icon match
    Locator::Css(r#"button:has(svg[class*="github"])"#),
    Locator::Css(r#"a:has(svg[class*="github"])"#),
    // aria label
    Locator::Css(r#"[aria-label*="GitHub"]"#),
    Locator::Css(r#"[aria-label*="github"]"#),
    // provider attribute / link href
    Locator::Css(r#"button[data-provider="github"]"#),
    Locator::Css(r#"a[href*="/oauth/github"]"#),
    Locator::Css(r#"a[href*="github"]"#),
];

const GOOGLE_LOCATORS: &[Locator] = &[
    Locator::Text {
        tag: "button",
        needle: "Google",
    },
    Locator::Text {
        tag: "a",
        needle: "Google",
    },
    Locator::Css(r#"[class*="google"]"#),
    Locator::Css(r#"[aria-label*="Google"]"#),
];

const LINUXDO_LOCATORS: &[Locator] = &[
    Locator::Text {
        tag: "button",
        needle: "LinuxDo",
    },
    Locator::Text {
        tag: "a",
        needle: "LinuxDo",
    },
    Locator::Text {
        tag: "button",
        needle: "LINUX DO",
    },
    Locator::Css(r#"[class*="linuxdo"]"#),
];

/// OAuth sign-in button heuristics for a provider.
pub fn oauth_locators(provider: OauthProvider) -> &'static [Locator] {
    match provider {
        OauthProvider::Github => GITHUB_LOCATORS,
        OauthProvider::Google => GOOGLE_LOCATORS,
        OauthProvider::LinuxDo => LINUXDO_LOCATORS,
    }
}
