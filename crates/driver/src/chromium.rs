//! Chromium-family extension
//!
//! [`ChromiumDriver`] wraps a [`RemoteDriver`] and adds what only Chromium
//! drivers speak: CDP commands tunnelled over HTTP, cast sinks, network
//! emulation, and a direct DevTools socket resolved from the session's
//! `debuggerAddress`. Cast discovery and mirroring confirmation poll through
//! [`Wait`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::capabilities::SessionRequest;
use crate::cdp::{self, CdpConnection};
use crate::config::{ExecutorConfig, ServiceConfig};
use crate::driver::{Invoker, Overrides, RemoteDriver};
use crate::error::{Result, WebDriverError};
use crate::response::ResponseEnvelope;
use crate::vendor::{self, Chromium};
use crate::wait::{Check, Wait};

/// A cast-capable device as reported by the driver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CastSink {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Description of the active cast session, if one is running.
    #[serde(default)]
    pub session: Option<String>,
}

impl CastSink {
    pub fn is_casting(&self) -> bool {
        self.session.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub offline: bool,
    /// Additional round-trip latency in milliseconds.
    pub latency: u64,
    /// Bytes per second; -1 disables throttling.
    pub download_throughput: i64,
    pub upload_throughput: i64,
}

/// Chromium-only commands, available to any invoker whose registry carries
/// the Chromium extra routes.
#[async_trait]
pub trait DevTools: Invoker {
    /// Run one CDP command through the driver and return its result.
    async fn execute_cdp_command(&self, method: &str, params: Value) -> Result<Value> {
        self.execute(
            vendor::EXECUTE_CDP_COMMAND,
            Some(json!({ "cmd": method, "params": params })),
        )
        .await
    }

    async fn cast_sinks(&self) -> Result<Vec<CastSink>> {
        let value = self.execute(vendor::GET_CAST_SINKS, None).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|e| WebDriverError::protocol(format!("malformed cast sink list: {e}")))
    }

    async fn select_cast_sink(&self, name: &str) -> Result<()> {
        self.execute(vendor::SELECT_CAST_SINK, Some(json!({ "sinkName": name })))
            .await
            .map(|_| ())
    }

    async fn start_tab_mirroring(&self, name: &str) -> Result<()> {
        self.execute(
            vendor::START_CAST_TAB_MIRRORING,
            Some(json!({ "sinkName": name })),
        )
        .await
        .map(|_| ())
    }

    async fn start_desktop_mirroring(&self, name: &str) -> Result<()> {
        self.execute(
            vendor::START_CAST_DESKTOP_MIRRORING,
            Some(json!({ "sinkName": name })),
        )
        .await
        .map(|_| ())
    }

    /// The latest cast error, if any.
    async fn cast_issue_message(&self) -> Result<Option<String>> {
        let value = self.execute(vendor::GET_CAST_ISSUE_MESSAGE, None).await?;
        Ok(value.as_str().filter(|s| !s.is_empty()).map(str::to_string))
    }

    async fn stop_casting(&self, name: &str) -> Result<()> {
        self.execute(vendor::STOP_CASTING, Some(json!({ "sinkName": name })))
            .await
            .map(|_| ())
    }

    /// Poll until a sink named `name` is discovered.
    async fn wait_for_sink(&self, name: &str, wait: &Wait) -> Result<CastSink> {
        wait.until(|| async move {
            let sinks = self.cast_sinks().await?;
            Ok::<_, WebDriverError>(sinks.into_iter().find(|s| s.name == name))
        })
        .await
    }

    /// Poll until the sink reports an active session. A cast issue reported
    /// meanwhile ends the wait with an error.
    async fn wait_for_mirroring(&self, name: &str, wait: &Wait) -> Result<CastSink> {
        wait.until(|| async move {
            if let Some(issue) = self.cast_issue_message().await? {
                return Err(WebDriverError::protocol(format!("cast issue: {issue}")));
            }
            let sink = self
                .cast_sinks()
                .await?
                .into_iter()
                .find(|s| s.name == name && s.is_casting());
            Ok(match sink {
                Some(sink) => Check::Ready(sink),
                None => Check::Retry,
            })
        })
        .await
    }

    async fn network_conditions(&self) -> Result<NetworkConditions> {
        let value = self.execute(vendor::GET_NETWORK_CONDITIONS, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn set_network_conditions(&self, conditions: &NetworkConditions) -> Result<()> {
        self.execute(
            vendor::SET_NETWORK_CONDITIONS,
            Some(json!({ "network_conditions": conditions })),
        )
        .await
        .map(|_| ())
    }

    async fn delete_network_conditions(&self) -> Result<()> {
        self.execute(vendor::DELETE_NETWORK_CONDITIONS, None)
            .await
            .map(|_| ())
    }

    async fn launch_app(&self, id: &str) -> Result<()> {
        self.execute(vendor::LAUNCH_APP, Some(json!({ "id": id })))
            .await
            .map(|_| ())
    }
}

/// `debuggerAddress` from negotiated capabilities, looked up in whichever
/// vendor options object carries it.
pub fn debugger_address(capabilities: &Value) -> Option<String> {
    capabilities
        .as_object()?
        .values()
        .filter_map(|v| v.get("debuggerAddress"))
        .find_map(Value::as_str)
        .map(str::to_string)
}

pub struct ChromiumDriver {
    inner: RemoteDriver,
    devtools: Option<Arc<CdpConnection>>,
}

impl ChromiumDriver {
    pub fn from_remote(inner: RemoteDriver) -> Self {
        Self {
            inner,
            devtools: None,
        }
    }

    pub async fn connect(
        url: Url,
        vendor: Chromium,
        request: SessionRequest,
        config: ExecutorConfig,
    ) -> Result<Self> {
        let inner = RemoteDriver::connect(url, Arc::new(vendor), request, config).await?;
        Ok(Self::from_remote(inner))
    }

    pub async fn launch(
        vendor: Chromium,
        service: ServiceConfig,
        request: SessionRequest,
        config: ExecutorConfig,
    ) -> Result<Self> {
        let inner = RemoteDriver::launch(Arc::new(vendor), service, request, config).await?;
        Ok(Self::from_remote(inner))
    }

    /// Direct DevTools socket to the browser, opened on first use.
    pub async fn devtools(&mut self) -> Result<Arc<CdpConnection>> {
        if let Some(connection) = &self.devtools {
            return Ok(connection.clone());
        }

        let session = self.inner.session().ok_or(WebDriverError::NoSession)?;
        let address = debugger_address(&session.capabilities).ok_or_else(|| {
            WebDriverError::protocol("session capabilities carry no debuggerAddress")
        })?;
        let ws_url = cdp::browser_websocket_url(&address).await?;
        let connection = CdpConnection::connect(ws_url).await?;

        self.devtools = Some(connection.clone());
        Ok(connection)
    }

    /// Close the DevTools socket, then quit the inner driver.
    pub async fn quit(&mut self) -> Result<()> {
        if let Some(connection) = self.devtools.take() {
            connection.disconnect().await?;
        }
        self.inner.quit().await
    }

    pub fn into_inner(self) -> RemoteDriver {
        self.inner
    }
}

impl Deref for ChromiumDriver {
    type Target = RemoteDriver;

    fn deref(&self) -> &RemoteDriver {
        &self.inner
    }
}

impl DerefMut for ChromiumDriver {
    fn deref_mut(&mut self) -> &mut RemoteDriver {
        &mut self.inner
    }
}

#[async_trait]
impl Invoker for ChromiumDriver {
    async fn invoke(
        &self,
        name: &str,
        payload: Option<Value>,
        overrides: Overrides,
    ) -> Result<ResponseEnvelope> {
        self.inner.invoke(name, payload, overrides).await
    }
}

impl DevTools for ChromiumDriver {}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("inner", &self.inner)
            .field("devtools", &self.devtools.is_some())
            .finish()
    }
}
