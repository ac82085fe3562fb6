//! Command registry
//!
//! Maps command names to an HTTP verb plus a route template. Templates carry
//! `$[name]` placeholders that are substituted per invocation; `session` and
//! `element` come from the descriptor overrides, anything else from named
//! parameters. A placeholder left without a value is a caller bug and is
//! reported as [`WebDriverError::UnresolvedPlaceholder`] before any request
//! leaves the process.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Result, WebDriverError};

pub const NEW_SESSION: &str = "newSession";
pub const DELETE_SESSION: &str = "deleteSession";
pub const STATUS: &str = "status";
pub const GET_TIMEOUTS: &str = "getTimeouts";
pub const SET_TIMEOUTS: &str = "setTimeouts";
pub const GET: &str = "get";
pub const GET_CURRENT_URL: &str = "getCurrentUrl";
pub const GO_BACK: &str = "goBack";
pub const GO_FORWARD: &str = "goForward";
pub const REFRESH: &str = "refresh";
pub const GET_TITLE: &str = "getTitle";
pub const GET_WINDOW_HANDLE: &str = "getWindowHandle";
pub const CLOSE_WINDOW: &str = "closeWindow";
pub const SWITCH_TO_WINDOW: &str = "switchToWindow";
pub const GET_WINDOW_HANDLES: &str = "getWindowHandles";
pub const NEW_WINDOW: &str = "newWindow";
pub const SWITCH_TO_FRAME: &str = "switchToFrame";
pub const SWITCH_TO_PARENT_FRAME: &str = "switchToParentFrame";
pub const GET_WINDOW_RECT: &str = "getWindowRect";
pub const SET_WINDOW_RECT: &str = "setWindowRect";
pub const MAXIMIZE_WINDOW: &str = "maximizeWindow";
pub const MINIMIZE_WINDOW: &str = "minimizeWindow";
pub const FULLSCREEN_WINDOW: &str = "fullscreenWindow";
pub const GET_ACTIVE_ELEMENT: &str = "getActiveElement";
pub const FIND_ELEMENT: &str = "findElement";
pub const FIND_ELEMENTS: &str = "findElements";
pub const FIND_CHILD_ELEMENT: &str = "findChildElement";
pub const FIND_CHILD_ELEMENTS: &str = "findChildElements";
pub const IS_ELEMENT_SELECTED: &str = "isElementSelected";
pub const GET_ELEMENT_ATTRIBUTE: &str = "getElementAttribute";
pub const GET_ELEMENT_PROPERTY: &str = "getElementProperty";
pub const GET_ELEMENT_CSS_VALUE: &str = "getElementCssValue";
pub const GET_ELEMENT_TEXT: &str = "getElementText";
pub const GET_ELEMENT_TAG_NAME: &str = "getElementTagName";
pub const GET_ELEMENT_RECT: &str = "getElementRect";
pub const IS_ELEMENT_ENABLED: &str = "isElementEnabled";
pub const ELEMENT_CLICK: &str = "elementClick";
pub const ELEMENT_CLEAR: &str = "elementClear";
pub const ELEMENT_SEND_KEYS: &str = "elementSendKeys";
pub const GET_PAGE_SOURCE: &str = "getPageSource";
pub const EXECUTE_SCRIPT: &str = "executeScript";
pub const EXECUTE_ASYNC_SCRIPT: &str = "executeAsyncScript";
pub const GET_ALL_COOKIES: &str = "getAllCookies";
pub const GET_NAMED_COOKIE: &str = "getNamedCookie";
pub const ADD_COOKIE: &str = "addCookie";
pub const DELETE_COOKIE: &str = "deleteCookie";
pub const DELETE_ALL_COOKIES: &str = "deleteAllCookies";
pub const PERFORM_ACTIONS: &str = "performActions";
pub const RELEASE_ACTIONS: &str = "releaseActions";
pub const DISMISS_ALERT: &str = "dismissAlert";
pub const ACCEPT_ALERT: &str = "acceptAlert";
pub const GET_ALERT_TEXT: &str = "getAlertText";
pub const SEND_ALERT_TEXT: &str = "sendAlertText";
pub const TAKE_SCREENSHOT: &str = "takeScreenshot";
pub const TAKE_ELEMENT_SCREENSHOT: &str = "takeElementScreenshot";
pub const PRINT_PAGE: &str = "printPage";

/// HTTP verb of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    /// Only POST carries a JSON body on the wire.
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post)
    }

    pub(crate) fn to_http(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        })
    }
}

/// One named wire operation. The registry stores templates; each invocation
/// works on its own clone.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub method: Method,
    pub route: String,
    pub payload: Option<Value>,
    pub session: Option<String>,
    pub element: Option<String>,
    pub params: HashMap<String, String>,
    /// Overrides the default JSON media type.
    pub content_type: Option<String>,
}

impl CommandDescriptor {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            payload: None,
            session: None,
            element: None,
            params: HashMap::new(),
            content_type: None,
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(Method::Get, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(Method::Post, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(Method::Delete, route)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Names of every placeholder in the route, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.route.as_str();
        while let Some(start) = rest.find("$[") {
            let after = &rest[start + 2..];
            match after.find(']') {
                Some(end) => {
                    names.push(&after[..end]);
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        names
    }

    /// Substitute every placeholder and return the concrete path.
    pub fn resolve(&self) -> Result<String> {
        let mut path = String::with_capacity(self.route.len());
        let mut rest = self.route.as_str();

        while let Some(start) = rest.find("$[") {
            path.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find(']').ok_or_else(|| WebDriverError::UnresolvedPlaceholder {
                route: self.route.clone(),
                placeholder: after.to_string(),
            })?;
            let name = &after[..end];

            let value = match name {
                "session" => self.session.as_deref(),
                "element" => self.element.as_deref(),
                other => self.params.get(other).map(String::as_str),
            }
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WebDriverError::UnresolvedPlaceholder {
                route: self.route.clone(),
                placeholder: name.to_string(),
            })?;

            path.push_str(value);
            rest = &after[end + 1..];
        }

        path.push_str(rest);
        Ok(path)
    }
}

/// Name → descriptor table owned by one driver.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the W3C base command set.
    pub fn w3c() -> Self {
        let mut registry = Self::new();
        registry.extend(w3c_commands());
        registry
    }

    /// Add or replace a command.
    pub fn register(&mut self, name: impl Into<String>, descriptor: CommandDescriptor) {
        let name = name.into();
        if self.commands.insert(name.clone(), descriptor).is_some() {
            tracing::debug!(command = %name, "command route overridden");
        }
    }

    /// Add an ordered list of commands; later entries win.
    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (S, CommandDescriptor)>,
        S: Into<String>,
    {
        for (name, descriptor) in entries {
            self.register(name, descriptor);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Per-invocation copy of a registered command.
    pub fn descriptor(&self, name: &str) -> Result<CommandDescriptor> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| WebDriverError::UnknownCommand(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn w3c_commands() -> Vec<(&'static str, CommandDescriptor)> {
    use CommandDescriptor as C;
    vec![
        (NEW_SESSION, C::post("/session")),
        (DELETE_SESSION, C::delete("/session/$[session]")),
        (STATUS, C::get("/status")),
        (GET_TIMEOUTS, C::get("/session/$[session]/timeouts")),
        (SET_TIMEOUTS, C::post("/session/$[session]/timeouts")),
        (GET, C::post("/session/$[session]/url")),
        (GET_CURRENT_URL, C::get("/session/$[session]/url")),
        (GO_BACK, C::post("/session/$[session]/back")),
        (GO_FORWARD, C::post("/session/$[session]/forward")),
        (REFRESH, C::post("/session/$[session]/refresh")),
        (GET_TITLE, C::get("/session/$[session]/title")),
        (GET_WINDOW_HANDLE, C::get("/session/$[session]/window")),
        (CLOSE_WINDOW, C::delete("/session/$[session]/window")),
        (SWITCH_TO_WINDOW, C::post("/session/$[session]/window")),
        (GET_WINDOW_HANDLES, C::get("/session/$[session]/window/handles")),
        (NEW_WINDOW, C::post("/session/$[session]/window/new")),
        (SWITCH_TO_FRAME, C::post("/session/$[session]/frame")),
        (SWITCH_TO_PARENT_FRAME, C::post("/session/$[session]/frame/parent")),
        (GET_WINDOW_RECT, C::get("/session/$[session]/window/rect")),
        (SET_WINDOW_RECT, C::post("/session/$[session]/window/rect")),
        (MAXIMIZE_WINDOW, C::post("/session/$[session]/window/maximize")),
        (MINIMIZE_WINDOW, C::post("/session/$[session]/window/minimize")),
        (FULLSCREEN_WINDOW, C::post("/session/$[session]/window/fullscreen")),
        (GET_ACTIVE_ELEMENT, C::get("/session/$[session]/element/active")),
        (FIND_ELEMENT, C::post("/session/$[session]/element")),
        (FIND_ELEMENTS, C::post("/session/$[session]/elements")),
        (FIND_CHILD_ELEMENT, C::post("/session/$[session]/element/$[element]/element")),
        (FIND_CHILD_ELEMENTS, C::post("/session/$[session]/element/$[element]/elements")),
        (IS_ELEMENT_SELECTED, C::get("/session/$[session]/element/$[element]/selected")),
        (
            GET_ELEMENT_ATTRIBUTE,
            C::get("/session/$[session]/element/$[element]/attribute/$[attributeName]"),
        ),
        (
            GET_ELEMENT_PROPERTY,
            C::get("/session/$[session]/element/$[element]/property/$[propertyName]"),
        ),
        (
            GET_ELEMENT_CSS_VALUE,
            C::get("/session/$[session]/element/$[element]/css/$[propertyName]"),
        ),
        (GET_ELEMENT_TEXT, C::get("/session/$[session]/element/$[element]/text")),
        (GET_ELEMENT_TAG_NAME, C::get("/session/$[session]/element/$[element]/name")),
        (GET_ELEMENT_RECT, C::get("/session/$[session]/element/$[element]/rect")),
        (IS_ELEMENT_ENABLED, C::get("/session/$[session]/element/$[element]/enabled")),
        (ELEMENT_CLICK, C::post("/session/$[session]/element/$[element]/click")),
        (ELEMENT_CLEAR, C::post("/session/$[session]/element/$[element]/clear")),
        (ELEMENT_SEND_KEYS, C::post("/session/$[session]/element/$[element]/value")),
        (GET_PAGE_SOURCE, C::get("/session/$[session]/source")),
        (EXECUTE_SCRIPT, C::post("/session/$[session]/execute/sync")),
        (EXECUTE_ASYNC_SCRIPT, C::post("/session/$[session]/execute/async")),
        (GET_ALL_COOKIES, C::get("/session/$[session]/cookie")),
        (GET_NAMED_COOKIE, C::get("/session/$[session]/cookie/$[name]")),
        (ADD_COOKIE, C::post("/session/$[session]/cookie")),
        (DELETE_COOKIE, C::delete("/session/$[session]/cookie/$[name]")),
        (DELETE_ALL_COOKIES, C::delete("/session/$[session]/cookie")),
        (PERFORM_ACTIONS, C::post("/session/$[session]/actions")),
        (RELEASE_ACTIONS, C::delete("/session/$[session]/actions")),
        (DISMISS_ALERT, C::post("/session/$[session]/alert/dismiss")),
        (ACCEPT_ALERT, C::post("/session/$[session]/alert/accept")),
        (GET_ALERT_TEXT, C::get("/session/$[session]/alert/text")),
        (SEND_ALERT_TEXT, C::post("/session/$[session]/alert/text")),
        (TAKE_SCREENSHOT, C::get("/session/$[session]/screenshot")),
        (
            TAKE_ELEMENT_SCREENSHOT,
            C::get("/session/$[session]/element/$[element]/screenshot"),
        ),
        (PRINT_PAGE, C::post("/session/$[session]/print")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_resolve_attribute_route() {
        let cmd = CommandDescriptor::get(
            "/session/$[session]/element/$[element]/attribute/$[attributeName]",
        )
        .with_session("abc")
        .with_element("xyz")
        .with_param("attributeName", "value");

        assert_eq!(
            cmd.resolve().unwrap(),
            "/session/abc/element/xyz/attribute/value"
        );
    }

    #[test]
    fn test_unresolved_placeholder_fails() {
        let cmd = CommandDescriptor::get("/session/$[session]/element/$[element]/text")
            .with_session("abc");

        let err = cmd.resolve().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        match err {
            WebDriverError::UnresolvedPlaceholder { placeholder, .. } => {
                assert_eq!(placeholder, "element")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_value_counts_as_unresolved() {
        let cmd = CommandDescriptor::delete("/session/$[session]").with_session("");
        assert!(cmd.resolve().is_err());
    }

    #[test]
    fn test_route_without_placeholders() {
        assert_eq!(CommandDescriptor::get("/status").resolve().unwrap(), "/status");
    }

    #[test]
    fn test_placeholders_listed_in_order() {
        let cmd = CommandDescriptor::get("/a/$[session]/b/$[element]/c/$[name]");
        assert_eq!(cmd.placeholders(), vec!["session", "element", "name"]);
    }

    #[test]
    fn test_registry_extension_overrides() {
        let mut registry = CommandRegistry::w3c();
        let before = registry.len();
        registry.extend([
            ("launchApp", CommandDescriptor::post("/session/$[session]/chromium/launch_app")),
            (GET_TITLE, CommandDescriptor::get("/session/$[session]/custom/title")),
        ]);

        assert_eq!(registry.len(), before + 1);
        assert_eq!(
            registry.get(GET_TITLE).unwrap().route,
            "/session/$[session]/custom/title"
        );
    }

    #[test]
    fn test_descriptor_copy_is_independent() {
        let registry = CommandRegistry::w3c();
        let mut copy = registry.descriptor(GET).unwrap();
        copy.session = Some("abc".to_string());
        assert!(registry.get(GET).unwrap().session.is_none());
    }

    #[test]
    fn test_unknown_command() {
        let err = CommandRegistry::w3c().descriptor("teleport").unwrap_err();
        assert!(matches!(err, WebDriverError::UnknownCommand(_)));
    }

    #[test]
    fn test_base_routes_use_known_placeholders() {
        let registry = CommandRegistry::w3c();
        let allowed = ["session", "element", "attributeName", "propertyName", "name"];
        for (name, _) in w3c_commands() {
            let cmd = registry.get(name).unwrap();
            for p in cmd.placeholders() {
                assert!(allowed.contains(&p), "{name} uses {p}");
            }
        }
    }
}
