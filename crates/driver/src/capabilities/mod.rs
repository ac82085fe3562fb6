//! Capability model
//!
//! Builds `{capabilities: {alwaysMatch: {...}, firstMatch: [...]}}`.
//! Always-match keys compare case-insensitively; setting a key twice keeps one
//! entry with the last value (and the last spelling).

pub mod options;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;

pub use options::{ChromiumOptions, FirefoxOptions, LogLevel, UiaOptions, VendorOptions};

pub const BROWSER_NAME: &str = "browserName";
pub const BROWSER_VERSION: &str = "browserVersion";
pub const PLATFORM_NAME: &str = "platformName";
pub const ACCEPT_INSECURE_CERTS: &str = "acceptInsecureCerts";
pub const PAGE_LOAD_STRATEGY: &str = "pageLoadStrategy";
pub const UNHANDLED_PROMPT_BEHAVIOR: &str = "unhandledPromptBehavior";
pub const PROXY: &str = "proxy";
pub const TIMEOUTS: &str = "timeouts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLoadStrategy {
    Normal,
    Eager,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptBehavior {
    Dismiss,
    Accept,
    #[serde(rename = "dismiss and notify")]
    DismissAndNotify,
    #[serde(rename = "accept and notify")]
    AcceptAndNotify,
    Ignore,
}

/// Negotiated feature set requested at session creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    /// Lower-cased key → (key as last written, value).
    always_match: BTreeMap<String, (String, Value)>,
    first_match: Vec<Map<String, Value>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an always-match capability, replacing any key equal ignoring case.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        self.always_match
            .insert(key.to_ascii_lowercase(), (key, value.into()));
        self
    }

    /// Builder form of [`Capabilities::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.always_match
            .get(&key.to_ascii_lowercase())
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.always_match
            .remove(&key.to_ascii_lowercase())
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.always_match.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.always_match.len()
    }

    pub fn is_empty(&self) -> bool {
        self.always_match.is_empty() && self.first_match.is_empty()
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.get(BROWSER_NAME).and_then(Value::as_str)
    }

    pub fn with_browser_name(self, name: impl Into<String>) -> Self {
        self.with(BROWSER_NAME, name.into())
    }

    pub fn with_browser_version(self, version: impl Into<String>) -> Self {
        self.with(BROWSER_VERSION, version.into())
    }

    pub fn with_platform_name(self, platform: impl Into<String>) -> Self {
        self.with(PLATFORM_NAME, platform.into())
    }

    pub fn with_accept_insecure_certs(self, accept: bool) -> Self {
        self.with(ACCEPT_INSECURE_CERTS, accept)
    }

    pub fn with_page_load_strategy(self, strategy: PageLoadStrategy) -> Self {
        self.with(PAGE_LOAD_STRATEGY, to_value(strategy))
    }

    pub fn with_unhandled_prompt_behavior(self, behavior: PromptBehavior) -> Self {
        self.with(UNHANDLED_PROMPT_BEHAVIOR, to_value(behavior))
    }

    pub fn with_proxy(self, proxy: Value) -> Self {
        self.with(PROXY, proxy)
    }

    /// Session timeouts in milliseconds.
    pub fn with_timeouts(self, script: u64, page_load: u64, implicit: u64) -> Self {
        self.with(
            TIMEOUTS,
            json!({ "script": script, "pageLoad": page_load, "implicit": implicit }),
        )
    }

    /// Add one first-match alternative.
    pub fn with_first_match(mut self, alternative: Map<String, Value>) -> Self {
        self.first_match.push(alternative);
        self
    }

    /// Merge a vendor options object under `"<prefix>:<optionsKey>"`, letting
    /// the options contribute logging preferences through their own hook.
    pub fn with_options(mut self, options: &dyn VendorOptions) -> Result<Self> {
        let mut body = options.to_options_map()?;
        if let Some(level) = options.log_level() {
            options.apply_logging(level, &mut self, &mut body);
        }
        if !self.contains(BROWSER_NAME) {
            if let Some(name) = options.browser_name() {
                self.set(BROWSER_NAME, name);
            }
        }
        self.set(options.capability_key(), Value::Object(body));
        Ok(self)
    }

    pub fn always_match(&self) -> Map<String, Value> {
        self.always_match
            .values()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn first_match(&self) -> &[Map<String, Value>] {
        &self.first_match
    }

    /// Wire shape of the `capabilities` member.
    pub fn to_json(&self) -> Value {
        let first_match: Vec<Value> = if self.first_match.is_empty() {
            vec![json!({})]
        } else {
            self.first_match.iter().cloned().map(Value::Object).collect()
        };
        json!({
            "alwaysMatch": self.always_match(),
            "firstMatch": first_match,
        })
    }

    pub fn into_session_request(self) -> SessionRequest {
        SessionRequest::new(self)
    }
}

fn to_value<T: Serialize>(v: T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

/// Payload for session creation. Consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub capabilities: Capabilities,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Whether a driver constructed from this request opens the session immediately.
    pub start_session: bool,
}

impl SessionRequest {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            user: None,
            password: None,
            start_session: true,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn deferred(mut self) -> Self {
        self.start_session = false;
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("capabilities".to_string(), self.capabilities.to_json());
        if let Some(user) = &self.user {
            body.insert("user".to_string(), Value::String(user.clone()));
        }
        if let Some(password) = &self.password {
            body.insert("password".to_string(), Value::String(password.clone()));
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_different_case_keeps_last() {
        let mut caps = Capabilities::new();
        caps.set("acceptInsecureCerts", false);
        caps.set("ACCEPTINSECURECERTS", true);

        let always = caps.always_match();
        assert_eq!(always.len(), 1);
        assert_eq!(always.get("ACCEPTINSECURECERTS"), Some(&Value::Bool(true)));
        assert_eq!(caps.get("acceptinsecurecerts"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_wire_shape() {
        let caps = Capabilities::new()
            .with_browser_name("chrome")
            .with_page_load_strategy(PageLoadStrategy::Eager);
        let json = caps.into_session_request().to_json();

        assert_eq!(json["capabilities"]["alwaysMatch"]["browserName"], "chrome");
        assert_eq!(json["capabilities"]["alwaysMatch"]["pageLoadStrategy"], "eager");
        assert_eq!(json["capabilities"]["firstMatch"], json!([{}]));
        assert!(json.get("user").is_none());
    }

    #[test]
    fn test_missing_browser_name_is_valid() {
        let caps = Capabilities::new();
        assert!(caps.browser_name().is_none());
        let json = caps.to_json();
        assert_eq!(json["alwaysMatch"], json!({}));
    }

    #[test]
    fn test_first_match_alternatives() {
        let mut alt = Map::new();
        alt.insert("platformName".to_string(), json!("linux"));
        let caps = Capabilities::new().with_first_match(alt);
        assert_eq!(caps.to_json()["firstMatch"], json!([{"platformName": "linux"}]));
    }

    #[test]
    fn test_credentials_are_top_level() {
        let request = SessionRequest::new(Capabilities::new()).with_credentials("bob", "hunter2");
        let json = request.to_json();
        assert_eq!(json["user"], "bob");
        assert_eq!(json["password"], "hunter2");
        assert!(request.start_session);
        assert!(!request.deferred().start_session);
    }

    #[test]
    fn test_prompt_behavior_wire_names() {
        let caps = Capabilities::new()
            .with_unhandled_prompt_behavior(PromptBehavior::DismissAndNotify);
        assert_eq!(
            caps.get(UNHANDLED_PROMPT_BEHAVIOR),
            Some(&json!("dismiss and notify"))
        );
    }
}
