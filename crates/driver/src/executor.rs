//! HTTP command executor
//!
//! Resolves a [`CommandDescriptor`] against the remote base URL, performs the
//! request and normalizes the reply. One executor per remote end; the inner
//! reqwest client is cheap to clone and pools connections.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::command::CommandDescriptor;
use crate::config::ExecutorConfig;
use crate::error::{Result, WebDriverError};
use crate::response::ResponseEnvelope;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    base_url: Url,
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(base_url: Url, config: ExecutorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.command_timeout)
            .build()
            .map_err(|e| WebDriverError::transport(base_url.as_str(), e))?;

        Ok(Self {
            base_url,
            client,
            config,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Full request URL for a resolved route. The base URL may carry a path
    /// prefix (`/wd/hub`); routes are appended to it, never replacing it.
    pub fn endpoint(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Send one command and return the normalized, error-checked envelope.
    pub async fn execute(&self, descriptor: &CommandDescriptor) -> Result<ResponseEnvelope> {
        let route = descriptor.resolve()?;
        let url = self.endpoint(&route);

        let mut request = self
            .client
            .request(descriptor.method.to_http(), &url)
            .header(ACCEPT, "application/json");

        if descriptor.method.has_body() {
            let body = descriptor
                .payload
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default()));
            let content_type = descriptor
                .content_type
                .as_deref()
                .unwrap_or(&self.config.content_type);
            request = request
                .header(CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(&body)?);
        }

        tracing::debug!(method = %descriptor.method, url = %url, "sending command");

        let response = request
            .send()
            .await
            .map_err(|e| WebDriverError::transport(&url, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| WebDriverError::transport(&url, e))?;

        tracing::trace!(status, bytes = body.len(), "received response");

        ResponseEnvelope::from_body(status, &body).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/wd/hub")).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let executor = CommandExecutor::new(
            Url::parse("http://localhost:4444/wd/hub/").unwrap(),
            ExecutorConfig::default(),
        )
        .unwrap();
        assert_eq!(
            executor.endpoint("/session/abc/url"),
            "http://localhost:4444/wd/hub/session/abc/url"
        );
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_reads_value() {
        let router = Router::new().route(
            "/wd/hub/session/:id/url",
            post(|Json(body): Json<Value>| async move { Json(json!({ "value": body["url"] })) }),
        );
        let executor = CommandExecutor::new(serve(router).await, ExecutorConfig::default()).unwrap();

        let descriptor = CommandDescriptor::post("/session/$[session]/url")
            .with_session("s1")
            .with_payload(json!({ "url": "https://example.com" }));
        let envelope = executor.execute(&descriptor).await.unwrap();

        assert_eq!(envelope.value, Some(json!("https://example.com")));
    }

    #[tokio::test]
    async fn test_error_payload_maps_to_kind() {
        let router = Router::new().route(
            "/wd/hub/session/:id/element",
            post(|| async {
                (
                    axum::http::StatusCode::NOT_FOUND,
                    Json(json!({ "value": {
                        "error": "no such element",
                        "message": "Unable to locate element",
                        "stacktrace": ""
                    }})),
                )
            }),
        );
        let executor = CommandExecutor::new(serve(router).await, ExecutorConfig::default()).unwrap();

        let descriptor = CommandDescriptor::post("/session/$[session]/element").with_session("s1");
        let err = executor.execute(&descriptor).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoSuchElement);
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_unresolved_route_never_hits_the_wire() {
        let router = Router::new().route("/wd/hub/status", get(|| async { "unused" }));
        let executor = CommandExecutor::new(serve(router).await, ExecutorConfig::default()).unwrap();

        let err = executor
            .execute(&CommandDescriptor::get("/session/$[session]/title"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebDriverError::UnresolvedPlaceholder { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let executor = CommandExecutor::new(
            Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            ExecutorConfig::default(),
        )
        .unwrap();
        let err = executor
            .execute(&CommandDescriptor::get("/status"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
