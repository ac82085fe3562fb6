//! CDP (Chrome DevTools Protocol) client
//!
//! Single WebSocket connection, multiplexed sessions.

pub mod client;
pub mod protocol;
pub mod target;

pub use client::{CdpConnection, CdpError};
pub use protocol::{CdpEvent, CdpRequest, TargetInfo};
pub use target::CdpSession;

use crate::error::{Result, WebDriverError};
use protocol::BrowserVersion;

/// Resolve the browser-level WebSocket URL behind a `host:port` debugger
/// address through its `/json/version` endpoint.
pub async fn browser_websocket_url(debugger_address: &str) -> Result<String> {
    let address = debugger_address
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let url = format!("http://{address}/json/version");

    let version: BrowserVersion = reqwest::get(&url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| WebDriverError::transport(&url, e))?
        .json()
        .await
        .map_err(|e| WebDriverError::protocol(format!("bad /json/version reply: {e}")))?;

    tracing::debug!(browser = %version.browser, "resolved debugger address");
    Ok(version.web_socket_debugger_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[tokio::test]
    async fn test_debugger_address_resolves_websocket_url() {
        let router = Router::new().route(
            "/json/version",
            get(|| async {
                Json(json!({
                    "Browser": "Chrome/120.0.6099.109",
                    "Protocol-Version": "1.3",
                    "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let ws = browser_websocket_url(&addr.to_string()).await.unwrap();
        assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/abc");
    }
}
