//! CDP wire types
//!
//! Outbound `{id, method, params, sessionId?}`; inbound either a reply
//! `{id, result | error}` or an event `{method, params, sessionId?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing, never reused on one connection
pub type RequestId = u64;

pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Error member of a reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpFault {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Event pushed by the browser (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Entry of `Target.getTargets`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}

/// Reply of `GET http://<debuggerAddress>/json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Synthesized document delivered in place of a frame that is not JSON.
pub fn malformed_frame(error: &str, raw: &str) -> Value {
    serde_json::json!({ "Error": error, "Raw": raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_absent_members() {
        let request = CdpRequest {
            id: 7,
            method: "Target.getTargets".to_string(),
            params: None,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "id": 7, "method": "Target.getTargets" })
        );
    }

    #[test]
    fn test_target_info_tolerates_missing_optional_fields() {
        let info: TargetInfo =
            serde_json::from_value(json!({ "targetId": "T1", "type": "page" })).unwrap();
        assert_eq!(info.target_id, "T1");
        assert!(!info.attached);
    }
}
