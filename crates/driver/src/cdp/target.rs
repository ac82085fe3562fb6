//! CDP session bound to one attached target
//!
//! Lightweight wrapper around [`CdpConnection`] carrying the target's session
//! id. All sessions share the connection's socket.

use std::sync::Arc;

use serde_json::{json, Value};

use super::client::{CdpConnection, CdpError, Result};
use super::protocol::{SessionId, TargetId, TargetInfo};

#[derive(Debug, Clone)]
pub struct CdpSession {
    connection: Arc<CdpConnection>,
    pub target_id: TargetId,
    /// Session ID assigned by the browser
    pub session_id: SessionId,
}

impl CdpSession {
    /// Attach to a target and enable `domains` in it. Enable failures are
    /// logged, not fatal.
    pub async fn attach(
        connection: Arc<CdpConnection>,
        target_id: impl Into<TargetId>,
        domains: &[&str],
    ) -> Result<Self> {
        let target_id = target_id.into();
        let session_id = connection.attach_to_target(&target_id).await?;

        let session = Self {
            connection,
            target_id,
            session_id,
        };

        for domain in domains {
            if let Err(e) = session.send(format!("{domain}.enable"), None).await {
                tracing::warn!(domain, error = %e, "domain enable failed");
            }
        }

        Ok(session)
    }

    /// Attach to the first page target.
    pub async fn attach_first_page(connection: Arc<CdpConnection>) -> Result<Self> {
        let page = connection
            .get_targets()
            .await?
            .into_iter()
            .find(|t| t.target_type == "page")
            .ok_or_else(|| CdpError::MissingField {
                method: "Target.getTargets".to_string(),
                field: "page target".to_string(),
            })?;
        Self::attach(connection, page.target_id, &[]).await
    }

    pub fn connection(&self) -> &Arc<CdpConnection> {
        &self.connection
    }

    /// Send command within this session's context
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.connection
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    pub async fn target_info(&self) -> Result<TargetInfo> {
        let mut result = self
            .connection
            .send_request(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;
        let info = result
            .get_mut("targetInfo")
            .map(Value::take)
            .unwrap_or_default();
        Ok(serde_json::from_value(info)?)
    }

    pub async fn navigate(&self, url: &str) -> Result<Value> {
        self.send("Page.navigate", Some(json!({ "url": url }))).await
    }

    /// Evaluate JavaScript, returning the result by value
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.send(
            "Runtime.evaluate",
            Some(json!({ "expression": expression, "returnByValue": true })),
        )
        .await
    }

    pub async fn detach(self) -> Result<()> {
        self.connection
            .send_request(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": self.session_id })),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_commands_carry_session_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                let result = match request["method"].as_str() {
                    Some("Target.attachToTarget") => json!({ "sessionId": "S-9" }),
                    _ => json!({}),
                };
                seen_tx.send(request.clone()).unwrap();
                let reply = json!({ "id": request["id"], "result": result });
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });

        let connection = CdpConnection::connect(format!("ws://{addr}")).await.unwrap();
        let session = CdpSession::attach(connection, "T-9", &["Page"]).await.unwrap();
        assert_eq!(session.session_id, "S-9");

        let attach = seen_rx.recv().await.unwrap();
        assert!(attach.get("sessionId").is_none());
        let enable = seen_rx.recv().await.unwrap();
        assert_eq!(enable["method"], "Page.enable");
        assert_eq!(enable["sessionId"], "S-9");
    }
}
