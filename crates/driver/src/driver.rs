//! Remote driver
//!
//! [`RemoteDriver`] composes a command registry, an HTTP executor, the live
//! session and, when it launched one, the local driver service. Vendor
//! differences come in through [`Vendor`]; CDP-capable drivers wrap this type
//! instead of extending it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

use crate::capabilities::SessionRequest;
use crate::command::{self, CommandRegistry};
use crate::config::{ExecutorConfig, ServiceConfig};
use crate::error::{Result, WebDriverError};
use crate::executor::CommandExecutor;
use crate::response::ResponseEnvelope;
use crate::service::{self, DriverService, ServiceStatus};
use crate::vendor::Vendor;

/// W3C web element identifier key.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Per-call placeholder values. Unset fields fall back to the live session.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub session: Option<String>,
    pub element: Option<String>,
    pub params: HashMap<String, String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session = Some(id.into());
        self
    }

    pub fn element(mut self, id: impl Into<String>) -> Self {
        self.element = Some(id.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Named-command dispatch. This is the whole contract consumed by the action
/// encoder and by element-level helpers.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        name: &str,
        payload: Option<Value>,
        overrides: Overrides,
    ) -> Result<ResponseEnvelope>;

    /// Invoke with no overrides and return the envelope's value (`null` when absent).
    async fn execute(&self, name: &str, payload: Option<Value>) -> Result<Value> {
        let envelope = self.invoke(name, payload, Overrides::default()).await?;
        Ok(envelope.value.unwrap_or(Value::Null))
    }
}

/// Live session handle.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Opaque, non-empty session key.
    pub id: String,
    /// Capabilities echoed back by the server.
    pub capabilities: Value,
}

impl SessionContext {
    pub fn browser_name(&self) -> Option<&str> {
        self.capabilities.get("browserName").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "element-6066-11e4-a52e-4f735466cecf")]
    pub id: String,
}

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }

    fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| WebDriverError::protocol(format!("not an element reference: {e}")))
    }
}

pub struct RemoteDriver {
    /// Client-side id, for correlating log lines.
    id: Uuid,
    vendor: Arc<dyn Vendor>,
    executor: CommandExecutor,
    commands: CommandRegistry,
    session: Option<SessionContext>,
    service: Option<DriverService>,
}

impl RemoteDriver {
    /// Driver bound to an endpoint, with no session yet.
    pub fn new(url: Url, vendor: Arc<dyn Vendor>, config: ExecutorConfig) -> Result<Self> {
        let mut commands = CommandRegistry::w3c();
        commands.extend(vendor.extra_commands());

        Ok(Self {
            id: Uuid::now_v7(),
            executor: CommandExecutor::new(url, config)?,
            vendor,
            commands,
            session: None,
            service: None,
        })
    }

    /// Attach to a running remote end, opening a session unless the request
    /// is deferred.
    pub async fn connect(
        url: Url,
        vendor: Arc<dyn Vendor>,
        request: SessionRequest,
        config: ExecutorConfig,
    ) -> Result<Self> {
        let mut driver = Self::new(url, vendor, config)?;
        if request.start_session {
            driver.start_session(request).await?;
        }
        Ok(driver)
    }

    /// Start a local driver service for `vendor` and attach to it. The driver
    /// owns the service and stops it on [`quit`](Self::quit).
    pub async fn launch(
        vendor: Arc<dyn Vendor>,
        service_config: ServiceConfig,
        request: SessionRequest,
        config: ExecutorConfig,
    ) -> Result<Self> {
        let mut service = DriverService::for_vendor(vendor.as_ref(), service_config)?;
        service.start().await?;

        let mut driver = match Self::new(service.url().clone(), vendor, config) {
            Ok(driver) => driver,
            Err(e) => {
                service.dispose().await;
                return Err(e);
            }
        };
        driver.service = Some(service);

        if request.start_session {
            if let Err(e) = driver.start_session(request).await {
                if let Err(quit_err) = driver.quit().await {
                    tracing::warn!(error = %quit_err, "cleanup after failed session start failed");
                }
                return Err(e);
            }
        }
        Ok(driver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn vendor(&self) -> &dyn Vendor {
        self.vendor.as_ref()
    }

    pub fn session(&self) -> Option<&SessionContext> {
        self.session.as_ref()
    }

    pub fn service(&self) -> Option<&DriverService> {
        self.service.as_ref()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Registry access for callers adding routes at runtime.
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    /// Create the session. Fails if one is already live.
    pub async fn start_session(&mut self, request: SessionRequest) -> Result<&SessionContext> {
        if self.session.is_some() {
            return Err(WebDriverError::Config("session already started".to_string()));
        }

        let payload = self.vendor.convert_capabilities(&request);
        let envelope = self
            .invoke(command::NEW_SESSION, Some(payload), Overrides::default())
            .await?;

        let id = envelope
            .session
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WebDriverError::protocol("new session reply without sessionId"))?;
        let capabilities = envelope
            .value
            .and_then(|mut v| v.get_mut("capabilities").map(Value::take))
            .unwrap_or(Value::Null);

        tracing::info!(driver = %self.id, vendor = self.vendor.name(), session = %id, "session created");
        Ok(self.session.insert(SessionContext { id, capabilities }))
    }

    /// Delete the session and stop an owned service. Safe to call twice.
    pub async fn quit(&mut self) -> Result<()> {
        let result = match &self.session {
            Some(_) => self
                .invoke(command::DELETE_SESSION, None, Overrides::default())
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        if let Some(session) = self.session.take() {
            tracing::info!(driver = %self.id, session = %session.id, "session deleted");
        }
        if let Some(mut service) = self.service.take() {
            service.dispose().await;
        }
        result
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        service::fetch_status(&self.executor).await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.execute(command::GET, Some(json!({ "url": url }))).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        string_value(self.execute(command::GET_CURRENT_URL, None).await?)
    }

    pub async fn title(&self) -> Result<String> {
        string_value(self.execute(command::GET_TITLE, None).await?)
    }

    pub async fn page_source(&self) -> Result<String> {
        string_value(self.execute(command::GET_PAGE_SOURCE, None).await?)
    }

    pub async fn back(&self) -> Result<()> {
        self.execute(command::GO_BACK, None).await.map(|_| ())
    }

    pub async fn refresh(&self) -> Result<()> {
        self.execute(command::REFRESH, None).await.map(|_| ())
    }

    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.execute(
            command::EXECUTE_SCRIPT,
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    pub async fn execute_async_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.execute(
            command::EXECUTE_ASYNC_SCRIPT,
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// `using` is a W3C locator strategy ("css selector", "xpath", ...).
    pub async fn find_element(&self, using: &str, value: &str) -> Result<ElementRef> {
        let found = self
            .execute(
                command::FIND_ELEMENT,
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        ElementRef::from_value(found)
    }

    pub async fn find_elements(&self, using: &str, value: &str) -> Result<Vec<ElementRef>> {
        let found = self
            .execute(
                command::FIND_ELEMENTS,
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        match found {
            Value::Array(items) => items.into_iter().map(ElementRef::from_value).collect(),
            other => Err(WebDriverError::protocol(format!(
                "expected element list, got {other}"
            ))),
        }
    }

    pub async fn element_attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let envelope = self
            .invoke(
                command::GET_ELEMENT_ATTRIBUTE,
                None,
                Overrides::new().element(&element.id).param("attributeName", name),
            )
            .await?;
        Ok(envelope.value.and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn element_text(&self, element: &ElementRef) -> Result<String> {
        let envelope = self
            .invoke(
                command::GET_ELEMENT_TEXT,
                None,
                Overrides::new().element(&element.id),
            )
            .await?;
        string_value(envelope.value.unwrap_or(Value::Null))
    }

    pub async fn click_element(&self, element: &ElementRef) -> Result<()> {
        self.invoke(
            command::ELEMENT_CLICK,
            None,
            Overrides::new().element(&element.id),
        )
        .await
        .map(|_| ())
    }

    /// PNG bytes of the viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let encoded = string_value(self.execute(command::TAKE_SCREENSHOT, None).await?)?;
        B64.decode(encoded.as_bytes())
            .map_err(|e| WebDriverError::protocol(format!("screenshot is not base64: {e}")))
    }
}

#[async_trait]
impl Invoker for RemoteDriver {
    async fn invoke(
        &self,
        name: &str,
        payload: Option<Value>,
        overrides: Overrides,
    ) -> Result<ResponseEnvelope> {
        let mut descriptor = self.commands.descriptor(name)?;
        if let Some(payload) = payload {
            descriptor = descriptor.with_payload(payload);
        }

        let session = overrides
            .session
            .or_else(|| self.session.as_ref().map(|s| s.id.clone()));
        match session {
            Some(session) => descriptor = descriptor.with_session(session),
            None if descriptor.placeholders().contains(&"session") => {
                return Err(WebDriverError::NoSession)
            }
            None => {}
        }
        if let Some(element) = overrides.element {
            descriptor = descriptor.with_element(element);
        }
        for (param, value) in overrides.params {
            descriptor = descriptor.with_param(param, value);
        }

        tracing::debug!(driver = %self.id, command = name, "invoking command");
        self.executor.execute(&descriptor).await
    }
}

impl std::fmt::Debug for RemoteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDriver")
            .field("id", &self.id)
            .field("vendor", &self.vendor.name())
            .field("endpoint", &self.executor.base_url().as_str())
            .field("session", &self.session)
            .finish()
    }
}

fn string_value(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(WebDriverError::protocol(format!(
            "expected a string value, got {other}"
        ))),
    }
}
