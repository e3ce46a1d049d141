//! API request recorder.
//!
//! Observes a page's outgoing requests and records those hitting an API
//! endpoint. Observation only: requests are never blocked or altered,
//! and entries keep their observation order.

use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::debug;

use crate::signin::{ApiCallLog, Logger, SigninError};

/// URL substring marking a request as an API call.
const API_MARKER: &str = "/api/";

/// Subscribe to the page's request stream and append `"<METHOD> <URL>"`
/// to `log` for every API request. The listener task ends when the page
/// (and with it the event stream) goes away.
pub async fn attach_api_recorder(
    page: Page,
    log: ApiCallLog,
    logger: Logger,
) -> Result<(), SigninError> {
    page.execute(EnableParams::default())
        .await
        .map_err(|e| SigninError::ScriptError(format!("Network.enable failed: {}", e)))?;

    let mut events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| SigninError::ScriptError(format!("request listener failed: {}", e)))?;

    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let url = &event.request.url;
            if url.contains(API_MARKER) {
                let entry = format!("{} {}", event.request.method, url);
                log.push(entry.clone());
                logger.log(&format!("[api-request] {}", entry));
            }
        }
        debug!("API request recorder stream ended");
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_marker_matches_path_segment() {
        assert!("https://example.org/api/user/self".contains(API_MARKER));
        assert!(!"https://example.org/login".contains(API_MARKER));
    }
}
