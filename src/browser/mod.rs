//! Browser automation module
//!
//! Stealth session lifecycle, the page driver seam, WAF cookie
//! projection, and the API request recorder.

mod cookies;
mod page;
mod recorder;
mod stealth;

pub use cookies::{collect_waf_cookies, missing_names, project_waf_cookies};
pub use page::{CdpPage, Locator, PageDriver};
pub(crate) use page::cookie_host;
pub use recorder::attach_api_recorder;
pub use stealth::{find_chrome, prepare_stealth_page, spawn_handler, StealthSession};
