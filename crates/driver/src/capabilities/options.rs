//! Vendor option objects
//!
//! Each option type contributes one sub-object under `"<prefix>:<optionsKey>"`.
//! The field → wire key table is the `#[serde(rename)]` list on each struct;
//! every field is named explicitly so the table reads top to bottom.
//! Builders consume and return `Self`, so repeated additive calls accumulate.
//! Binary blobs (extensions, profiles) stay raw until conversion, where they
//! are base64 encoded.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::Capabilities;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    All,
    Debug,
    Info,
    Warning,
    Severe,
    Off,
}

impl LogLevel {
    /// Level names understood by Chromium-family drivers.
    pub fn as_chromium(self) -> &'static str {
        match self {
            LogLevel::All => "ALL",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Severe => "SEVERE",
            LogLevel::Off => "OFF",
        }
    }

    /// Level names understood by geckodriver.
    pub fn as_gecko(self) -> &'static str {
        match self {
            LogLevel::All => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Severe => "error",
            LogLevel::Off => "fatal",
        }
    }
}

/// Vendor-specific options contributed to the always-match set.
pub trait VendorOptions: Send + Sync {
    fn prefix(&self) -> &str;

    fn options_key(&self) -> &str;

    fn capability_key(&self) -> String {
        format!("{}:{}", self.prefix(), self.options_key())
    }

    /// Browser name to use when the caller has not set one.
    fn browser_name(&self) -> Option<&str> {
        None
    }

    fn log_level(&self) -> Option<LogLevel> {
        None
    }

    /// The options sub-object, with binary blobs encoded.
    fn to_options_map(&self) -> Result<Map<String, Value>>;

    /// Logging hook. The default emits `"<prefix>:loggingPrefs"` beside the
    /// options object; vendors with a different shape override it.
    fn apply_logging(
        &self,
        level: LogLevel,
        caps: &mut Capabilities,
        _options: &mut Map<String, Value>,
    ) {
        caps.set(
            format!("{}:loggingPrefs", self.prefix()),
            json!({ "browser": level.as_chromium() }),
        );
    }
}

fn into_map<T: Serialize>(options: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(options)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

// ---------------------------------------------------------------------------
// Chromium family (Chrome, Edge)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChromiumOptions {
    #[serde(skip)]
    prefix: &'static str,
    #[serde(skip)]
    options_key: &'static str,
    #[serde(skip)]
    browser: &'static str,
    #[serde(skip)]
    log_level: Option<LogLevel>,
    #[serde(skip)]
    extensions: Vec<Vec<u8>>,

    #[serde(rename = "args", skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(rename = "binary", skip_serializing_if = "Option::is_none")]
    binary: Option<String>,
    #[serde(rename = "prefs", skip_serializing_if = "BTreeMap::is_empty")]
    prefs: BTreeMap<String, Value>,
    #[serde(rename = "localState", skip_serializing_if = "BTreeMap::is_empty")]
    local_state: BTreeMap<String, Value>,
    #[serde(rename = "detach", skip_serializing_if = "Option::is_none")]
    detach: Option<bool>,
    #[serde(rename = "debuggerAddress", skip_serializing_if = "Option::is_none")]
    debugger_address: Option<String>,
    #[serde(rename = "excludeSwitches", skip_serializing_if = "Vec::is_empty")]
    exclude_switches: Vec<String>,
    #[serde(rename = "minidumpPath", skip_serializing_if = "Option::is_none")]
    minidump_path: Option<String>,
    #[serde(rename = "mobileEmulation", skip_serializing_if = "Option::is_none")]
    mobile_emulation: Option<Value>,
    #[serde(rename = "perfLoggingPrefs", skip_serializing_if = "Option::is_none")]
    perf_logging_prefs: Option<Value>,
    #[serde(rename = "windowTypes", skip_serializing_if = "Vec::is_empty")]
    window_types: Vec<String>,
    #[serde(rename = "androidPackage", skip_serializing_if = "Option::is_none")]
    android_package: Option<String>,
}

impl ChromiumOptions {
    pub fn chrome() -> Self {
        Self {
            prefix: "goog",
            options_key: "chromeOptions",
            browser: "chrome",
            ..Default::default()
        }
    }

    pub fn edge() -> Self {
        Self {
            prefix: "ms",
            options_key: "edgeOptions",
            browser: "MicrosoftEdge",
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.binary = Some(path.into());
        self
    }

    pub fn with_pref(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.prefs.insert(name.into(), value.into());
        self
    }

    pub fn with_local_state(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local_state.insert(name.into(), value.into());
        self
    }

    pub fn with_detach(mut self, detach: bool) -> Self {
        self.detach = Some(detach);
        self
    }

    pub fn with_debugger_address(mut self, address: impl Into<String>) -> Self {
        self.debugger_address = Some(address.into());
        self
    }

    pub fn with_excluded_switch(mut self, switch: impl Into<String>) -> Self {
        self.exclude_switches.push(switch.into());
        self
    }

    pub fn with_minidump_path(mut self, path: impl Into<String>) -> Self {
        self.minidump_path = Some(path.into());
        self
    }

    pub fn with_mobile_emulation(mut self, emulation: Value) -> Self {
        self.mobile_emulation = Some(emulation);
        self
    }

    pub fn with_perf_logging_prefs(mut self, prefs: Value) -> Self {
        self.perf_logging_prefs = Some(prefs);
        self
    }

    pub fn with_window_type(mut self, window_type: impl Into<String>) -> Self {
        self.window_types.push(window_type.into());
        self
    }

    pub fn with_android_package(mut self, package: impl Into<String>) -> Self {
        self.android_package = Some(package.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Append a packed extension (.crx bytes).
    pub fn with_extension(mut self, crx: impl Into<Vec<u8>>) -> Self {
        self.extensions.push(crx.into());
        self
    }

    pub fn with_extension_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(self.with_extension(bytes))
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn debugger_address(&self) -> Option<&str> {
        self.debugger_address.as_deref()
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}

impl VendorOptions for ChromiumOptions {
    fn prefix(&self) -> &str {
        self.prefix
    }

    fn options_key(&self) -> &str {
        self.options_key
    }

    fn browser_name(&self) -> Option<&str> {
        Some(self.browser).filter(|b| !b.is_empty())
    }

    fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    fn to_options_map(&self) -> Result<Map<String, Value>> {
        let mut map = into_map(self)?;
        if !self.extensions.is_empty() {
            let encoded = self
                .extensions
                .iter()
                .map(|crx| Value::String(B64.encode(crx)))
                .collect();
            map.insert("extensions".to_string(), Value::Array(encoded));
        }
        Ok(map)
    }
}

// ---------------------------------------------------------------------------
// Firefox
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct FirefoxOptions {
    #[serde(skip)]
    log_level: Option<LogLevel>,
    #[serde(skip)]
    profile: Option<Vec<u8>>,

    #[serde(rename = "binary", skip_serializing_if = "Option::is_none")]
    binary: Option<String>,
    #[serde(rename = "args", skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(rename = "prefs", skip_serializing_if = "BTreeMap::is_empty")]
    prefs: BTreeMap<String, Value>,
    #[serde(rename = "env", skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(rename = "androidPackage", skip_serializing_if = "Option::is_none")]
    android_package: Option<String>,
    #[serde(rename = "androidActivity", skip_serializing_if = "Option::is_none")]
    android_activity: Option<String>,
    #[serde(rename = "androidDeviceSerial", skip_serializing_if = "Option::is_none")]
    android_device_serial: Option<String>,
}

impl FirefoxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.binary = Some(path.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_pref(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.prefs.insert(name.into(), value.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_android_package(mut self, package: impl Into<String>) -> Self {
        self.android_package = Some(package.into());
        self
    }

    pub fn with_android_activity(mut self, activity: impl Into<String>) -> Self {
        self.android_activity = Some(activity.into());
        self
    }

    pub fn with_android_device_serial(mut self, serial: impl Into<String>) -> Self {
        self.android_device_serial = Some(serial.into());
        self
    }

    /// Zipped profile directory.
    pub fn with_profile(mut self, zipped: impl Into<Vec<u8>>) -> Self {
        self.profile = Some(zipped.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }
}

impl VendorOptions for FirefoxOptions {
    fn prefix(&self) -> &str {
        "moz"
    }

    fn options_key(&self) -> &str {
        "firefoxOptions"
    }

    fn browser_name(&self) -> Option<&str> {
        Some("firefox")
    }

    fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    fn to_options_map(&self) -> Result<Map<String, Value>> {
        let mut map = into_map(self)?;
        if let Some(profile) = &self.profile {
            map.insert("profile".to_string(), Value::String(B64.encode(profile)));
        }
        Ok(map)
    }

    /// geckodriver reads `log: {level}` from inside its options object.
    fn apply_logging(
        &self,
        level: LogLevel,
        _caps: &mut Capabilities,
        options: &mut Map<String, Value>,
    ) {
        options.insert("log".to_string(), json!({ "level": level.as_gecko() }));
    }
}

// ---------------------------------------------------------------------------
// Windows UI Automation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct UiaOptions {
    #[serde(rename = "app", skip_serializing_if = "Option::is_none")]
    app: Option<String>,
    #[serde(rename = "appArguments", skip_serializing_if = "Option::is_none")]
    app_arguments: Option<String>,
    #[serde(rename = "appWorkingDir", skip_serializing_if = "Option::is_none")]
    app_working_dir: Option<String>,
    #[serde(rename = "label", skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(rename = "mount", skip_serializing_if = "Option::is_none")]
    mount: Option<String>,
    #[serde(rename = "launchDelay", skip_serializing_if = "Option::is_none")]
    launch_delay_ms: Option<u64>,
}

impl UiaOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_app_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.app_arguments = Some(arguments.into());
        self
    }

    pub fn with_app_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.app_working_dir = Some(dir.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    pub fn with_launch_delay_ms(mut self, delay: u64) -> Self {
        self.launch_delay_ms = Some(delay);
        self
    }
}

impl VendorOptions for UiaOptions {
    fn prefix(&self) -> &str {
        "uia"
    }

    fn options_key(&self) -> &str {
        "uiaOptions"
    }

    fn to_options_map(&self) -> Result<Map<String, Value>> {
        into_map(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_options_under_vendor_key() {
        let options = ChromiumOptions::chrome()
            .with_arg("--headless=new")
            .with_arg("--no-sandbox")
            .with_debugger_address("127.0.0.1:9222");
        let caps = Capabilities::new().with_options(&options).unwrap();

        let body = caps.get("goog:chromeOptions").unwrap();
        assert_eq!(body["args"], json!(["--headless=new", "--no-sandbox"]));
        assert_eq!(body["debuggerAddress"], "127.0.0.1:9222");
        assert!(body.get("binary").is_none());
        assert_eq!(caps.browser_name(), Some("chrome"));
    }

    #[test]
    fn test_extensions_accumulate_as_base64() {
        let options = ChromiumOptions::chrome()
            .with_extension(b"abc".to_vec())
            .with_extension(b"xyz".to_vec());
        assert_eq!(options.extension_count(), 2);

        let map = options.to_options_map().unwrap();
        assert_eq!(map["extensions"], json!(["YWJj", "eHl6"]));
    }

    #[test]
    fn test_builder_returns_new_value() {
        let base = ChromiumOptions::chrome().with_arg("--a");
        let extended = base.clone().with_arg("--b");
        assert_eq!(base.args(), ["--a"]);
        assert_eq!(extended.args(), ["--a", "--b"]);
    }

    #[test]
    fn test_chromium_logging_prefs_beside_options() {
        let options = ChromiumOptions::edge().with_log_level(LogLevel::All);
        let caps = Capabilities::new().with_options(&options).unwrap();

        assert_eq!(caps.get("ms:loggingPrefs"), Some(&json!({"browser": "ALL"})));
        assert!(caps.get("ms:edgeOptions").unwrap().get("log").is_none());
        assert_eq!(caps.browser_name(), Some("MicrosoftEdge"));
    }

    #[test]
    fn test_firefox_logging_nested_in_options() {
        let options = FirefoxOptions::new()
            .with_pref("dom.webnotifications.enabled", false)
            .with_log_level(LogLevel::Debug);
        let caps = Capabilities::new().with_options(&options).unwrap();

        let body = caps.get("moz:firefoxOptions").unwrap();
        assert_eq!(body["log"], json!({"level": "debug"}));
        assert_eq!(body["prefs"]["dom.webnotifications.enabled"], false);
        assert!(caps.get("moz:loggingPrefs").is_none());
    }

    #[test]
    fn test_caller_browser_name_wins() {
        let caps = Capabilities::new()
            .with_browser_name("chromium")
            .with_options(&ChromiumOptions::chrome())
            .unwrap();
        assert_eq!(caps.browser_name(), Some("chromium"));
    }

    #[test]
    fn test_uia_label_and_mount_have_distinct_keys() {
        let options = UiaOptions::new()
            .with_app("notepad.exe")
            .with_label("editor")
            .with_mount("C:\\data");
        let map = options.to_options_map().unwrap();

        assert_eq!(map["label"], "editor");
        assert_eq!(map["mount"], "C:\\data");
        assert_eq!(map["app"], "notepad.exe");
    }

    #[test]
    fn test_firefox_profile_encoded_at_conversion() {
        let map = FirefoxOptions::new()
            .with_profile(b"PK".to_vec())
            .to_options_map()
            .unwrap();
        assert_eq!(map["profile"], "UEs=");
    }
}
