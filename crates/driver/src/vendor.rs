//! Vendor boundary
//!
//! A vendor supplies what differs between driver executables: the executable
//! name and default port, an ordered list of extra commands, and an optional
//! reshaping of the session payload. Everything else is shared.

use serde_json::Value;

use crate::capabilities::SessionRequest;
use crate::command::CommandDescriptor;

pub const EXECUTE_CDP_COMMAND: &str = "executeCdpCommand";
pub const GET_CAST_SINKS: &str = "getCastSinks";
pub const SELECT_CAST_SINK: &str = "selectCastSink";
pub const START_CAST_TAB_MIRRORING: &str = "startCastTabMirroring";
pub const START_CAST_DESKTOP_MIRRORING: &str = "startCastDesktopMirroring";
pub const GET_CAST_ISSUE_MESSAGE: &str = "getCastIssueMessage";
pub const STOP_CASTING: &str = "stopCasting";
pub const GET_NETWORK_CONDITIONS: &str = "getNetworkConditions";
pub const SET_NETWORK_CONDITIONS: &str = "setNetworkConditions";
pub const DELETE_NETWORK_CONDITIONS: &str = "deleteNetworkConditions";
pub const LAUNCH_APP: &str = "launchApp";
pub const GET_LOG: &str = "getLog";
pub const GET_AVAILABLE_LOG_TYPES: &str = "getAvailableLogTypes";

pub const GET_CONTEXT: &str = "getContext";
pub const SET_CONTEXT: &str = "setContext";
pub const INSTALL_ADDON: &str = "installAddon";
pub const UNINSTALL_ADDON: &str = "uninstallAddon";
pub const FULL_PAGE_SCREENSHOT: &str = "fullPageScreenshot";

pub trait Vendor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn executable_name(&self) -> &str;

    /// First port tried when allocating; distinct per vendor.
    fn default_port(&self) -> u16;

    /// `browserName` filled in when the caller left it unset.
    fn browser_name(&self) -> Option<&str> {
        None
    }

    /// Commands added on top of the W3C set, in registration order.
    fn extra_commands(&self) -> Vec<(String, CommandDescriptor)> {
        Vec::new()
    }

    /// Session-creation payload for `request`.
    fn convert_capabilities(&self, request: &SessionRequest) -> Value {
        match self.browser_name() {
            Some(name) if request.capabilities.browser_name().is_none() => {
                let mut request = request.clone();
                request.capabilities.set(crate::capabilities::BROWSER_NAME, name);
                request.to_json()
            }
            _ => request.to_json(),
        }
    }
}

/// Chromium-family drivers. Chrome and Edge differ only in names, port and
/// the vendor prefix of their extension routes.
#[derive(Debug, Clone)]
pub struct Chromium {
    name: &'static str,
    executable: &'static str,
    port: u16,
    browser: &'static str,
    prefix: &'static str,
}

impl Chromium {
    pub fn chrome() -> Self {
        Self {
            name: "chrome",
            executable: "chromedriver",
            port: 9515,
            browser: "chrome",
            prefix: "goog",
        }
    }

    pub fn edge() -> Self {
        Self {
            name: "edge",
            executable: "msedgedriver",
            port: 9516,
            browser: "MicrosoftEdge",
            prefix: "ms",
        }
    }

    pub fn prefix(&self) -> &str {
        self.prefix
    }
}

impl Vendor for Chromium {
    fn name(&self) -> &str {
        self.name
    }

    fn executable_name(&self) -> &str {
        self.executable
    }

    fn default_port(&self) -> u16 {
        self.port
    }

    fn browser_name(&self) -> Option<&str> {
        Some(self.browser)
    }

    fn extra_commands(&self) -> Vec<(String, CommandDescriptor)> {
        use CommandDescriptor as C;
        let vendor = |path: &str| format!("/session/$[session]/{}/{path}", self.prefix);
        let network = "/session/$[session]/chromium/network_conditions";

        vec![
            (EXECUTE_CDP_COMMAND, C::post(vendor("cdp/execute"))),
            (GET_CAST_SINKS, C::get(vendor("cast/get_sinks"))),
            (SELECT_CAST_SINK, C::post(vendor("cast/set_sink_to_use"))),
            (START_CAST_TAB_MIRRORING, C::post(vendor("cast/start_tab_mirroring"))),
            (START_CAST_DESKTOP_MIRRORING, C::post(vendor("cast/start_desktop_mirroring"))),
            (GET_CAST_ISSUE_MESSAGE, C::get(vendor("cast/get_issue_message"))),
            (STOP_CASTING, C::post(vendor("cast/stop_casting"))),
            (GET_NETWORK_CONDITIONS, C::get(network)),
            (SET_NETWORK_CONDITIONS, C::post(network)),
            (DELETE_NETWORK_CONDITIONS, C::delete(network)),
            (LAUNCH_APP, C::post("/session/$[session]/chromium/launch_app")),
            (GET_LOG, C::post("/session/$[session]/se/log")),
            (GET_AVAILABLE_LOG_TYPES, C::get("/session/$[session]/se/log/types")),
        ]
        .into_iter()
        .map(|(name, descriptor)| (name.to_string(), descriptor))
        .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Firefox;

impl Vendor for Firefox {
    fn name(&self) -> &str {
        "firefox"
    }

    fn executable_name(&self) -> &str {
        "geckodriver"
    }

    fn default_port(&self) -> u16 {
        4444
    }

    fn browser_name(&self) -> Option<&str> {
        Some("firefox")
    }

    fn extra_commands(&self) -> Vec<(String, CommandDescriptor)> {
        use CommandDescriptor as C;
        vec![
            (GET_CONTEXT, C::get("/session/$[session]/moz/context")),
            (SET_CONTEXT, C::post("/session/$[session]/moz/context")),
            (INSTALL_ADDON, C::post("/session/$[session]/moz/addon/install")),
            (UNINSTALL_ADDON, C::post("/session/$[session]/moz/addon/uninstall")),
            (FULL_PAGE_SCREENSHOT, C::get("/session/$[session]/moz/screenshot/full")),
        ]
        .into_iter()
        .map(|(name, descriptor)| (name.to_string(), descriptor))
        .collect()
    }
}

/// Windows UI Automation driver.
#[derive(Debug, Clone, Default)]
pub struct Uia;

impl Vendor for Uia {
    fn name(&self) -> &str {
        "uia"
    }

    fn executable_name(&self) -> &str {
        "uiadriver"
    }

    fn default_port(&self) -> u16 {
        5555
    }

    /// The UIA server still reads the legacy `desiredCapabilities` member, so
    /// the always-match set is sent twice.
    fn convert_capabilities(&self, request: &SessionRequest) -> Value {
        let mut payload = request.to_json();
        let desired = Value::Object(request.capabilities.always_match());
        if let Value::Object(body) = &mut payload {
            body.insert("desiredCapabilities".to_string(), desired);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capabilities;
    use crate::command::{CommandRegistry, Method};

    #[test]
    fn test_default_ports_are_distinct() {
        let ports = [
            Chromium::chrome().default_port(),
            Chromium::edge().default_port(),
            Firefox.default_port(),
            Uia.default_port(),
        ];
        let unique: std::collections::HashSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), ports.len());
    }

    #[test]
    fn test_edge_routes_use_ms_prefix() {
        let mut registry = CommandRegistry::w3c();
        registry.extend(Chromium::edge().extra_commands());

        let cdp = registry
            .descriptor(EXECUTE_CDP_COMMAND)
            .unwrap()
            .with_session("s1");
        assert_eq!(cdp.method, Method::Post);
        assert_eq!(cdp.resolve().unwrap(), "/session/s1/ms/cdp/execute");
    }

    #[test]
    fn test_default_browser_name_fills_gap_only() {
        let request = Capabilities::new().into_session_request();
        let payload = Firefox.convert_capabilities(&request);
        assert_eq!(payload["capabilities"]["alwaysMatch"]["browserName"], "firefox");

        let request = Capabilities::new()
            .with_browser_name("firefox-nightly")
            .into_session_request();
        let payload = Firefox.convert_capabilities(&request);
        assert_eq!(
            payload["capabilities"]["alwaysMatch"]["browserName"],
            "firefox-nightly"
        );
    }

    #[test]
    fn test_uia_payload_carries_desired_capabilities() {
        let request = Capabilities::new()
            .with("uia:uiaOptions", serde_json::json!({ "app": "notepad.exe" }))
            .into_session_request();
        let payload = Uia.convert_capabilities(&request);

        assert_eq!(payload["desiredCapabilities"]["uia:uiaOptions"]["app"], "notepad.exe");
        assert_eq!(
            payload["capabilities"]["alwaysMatch"]["uia:uiaOptions"]["app"],
            "notepad.exe"
        );
    }
}
