//! Response normalization
//!
//! Every HTTP reply becomes a [`ResponseEnvelope`]. Parsing never fails: a
//! body that is not JSON yields an empty envelope and the caller decides.
//! Error-shaped values are mapped to typed errors through [`ERROR_TABLE`].

use serde_json::{Map, Value};

use crate::error::{ErrorKind, WebDriverError};

/// Normalized server reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseEnvelope {
    /// Session key echoed by the server, if any.
    pub session: Option<String>,
    /// The `value` member. `None` when absent or null.
    pub value: Option<Value>,
    /// HTTP status of the transport response.
    pub status: u16,
    /// Raw body as received.
    pub raw: String,
}

impl ResponseEnvelope {
    /// Build an envelope from a raw body. Never fails.
    pub fn from_body(status: u16, body: &str) -> Self {
        let mut envelope = Self {
            status,
            raw: body.to_string(),
            ..Default::default()
        };

        let document: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(status, error = %e, "response body is not JSON");
                return envelope;
            }
        };

        // Legacy servers report the session beside `value`.
        if let Some(id) = document.get("sessionId").and_then(Value::as_str) {
            envelope.session = Some(id.to_string());
        }

        match document.get("value") {
            None | Some(Value::Null) => {}
            Some(Value::Object(obj)) => {
                if let Some(id) = obj.get("sessionId").and_then(Value::as_str) {
                    envelope.session = Some(id.to_string());
                }
                envelope.value = Some(Value::Object(obj.clone()));
            }
            Some(other) => envelope.value = Some(other.clone()),
        }

        envelope
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The error record carried by this envelope, if its value is error-shaped.
    pub fn error_record(&self) -> Option<ErrorRecord> {
        self.value.as_ref().and_then(|v| ErrorRecord::parse(v, self.status))
    }

    /// Turn an error-shaped envelope into the mapped error; pass others through.
    pub fn into_result(self) -> Result<Self, WebDriverError> {
        if let Some(record) = self.error_record() {
            return Err(record.into_error());
        }
        if !self.is_success() {
            return Err(WebDriverError::protocol(format!(
                "HTTP {} without an error payload: {}",
                self.status,
                truncate(&self.raw, 200)
            )));
        }
        Ok(self)
    }

    /// Consume the envelope, yielding the value or JSON null.
    pub fn into_value(self) -> Value {
        self.value.unwrap_or(Value::Null)
    }
}

/// Server-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    pub stacktrace: Option<String>,
    pub status: u16,
}

impl ErrorRecord {
    /// Parse an error-shaped value. Key lookup ignores case, so both
    /// `stacktrace` and `stackTrace` are accepted.
    pub fn parse(value: &Value, status: u16) -> Option<Self> {
        let obj = value.as_object()?;
        let code = get_ignore_case(obj, "error")?.as_str()?;
        let message = get_ignore_case(obj, "message")?;

        Some(Self {
            code: code.to_string(),
            message: message.as_str().unwrap_or_default().to_string(),
            stacktrace: get_ignore_case(obj, "stacktrace")
                .and_then(Value::as_str)
                .map(str::to_string),
            status,
        })
    }

    /// Map onto the error table. The code alone selects the kind; the HTTP
    /// status is advisory and a mismatch is only logged.
    pub fn into_error(self) -> WebDriverError {
        match lookup(&self.code) {
            Some(mapping) => {
                if mapping.status != self.status {
                    tracing::debug!(
                        code = %self.code,
                        expected = mapping.status,
                        actual = self.status,
                        "error code arrived with unexpected HTTP status"
                    );
                }
                WebDriverError::Server {
                    kind: mapping.kind,
                    code: self.code,
                    message: self.message,
                    stacktrace: self.stacktrace,
                    status: self.status,
                }
            }
            None => WebDriverError::UnrecognizedServerError {
                code: self.code,
                message: self.message,
                status: self.status,
            },
        }
    }
}

/// One row of the error table.
#[derive(Debug, Clone, Copy)]
pub struct ErrorMapping {
    pub code: &'static str,
    pub status: u16,
    pub kind: ErrorKind,
}

const fn row(code: &'static str, status: u16, kind: ErrorKind) -> ErrorMapping {
    ErrorMapping { code, status, kind }
}

/// W3C error codes, their HTTP status, and the kind they map to.
pub const ERROR_TABLE: &[ErrorMapping] = &[
    row("element click intercepted", 400, ErrorKind::ElementClickIntercepted),
    row("element not interactable", 400, ErrorKind::ElementNotInteractable),
    row("insecure certificate", 400, ErrorKind::InsecureCertificate),
    row("invalid argument", 400, ErrorKind::InvalidArgument),
    row("invalid cookie domain", 400, ErrorKind::InvalidCookieDomain),
    row("invalid element state", 400, ErrorKind::InvalidElementState),
    row("invalid selector", 400, ErrorKind::InvalidSelector),
    row("invalid session id", 404, ErrorKind::InvalidSessionId),
    row("javascript error", 500, ErrorKind::JavascriptError),
    row("move target out of bounds", 500, ErrorKind::MoveTargetOutOfBounds),
    row("no such alert", 404, ErrorKind::NoSuchAlert),
    row("no such cookie", 404, ErrorKind::NoSuchCookie),
    row("no such element", 404, ErrorKind::NoSuchElement),
    row("no such frame", 404, ErrorKind::NoSuchFrame),
    row("no such window", 404, ErrorKind::NoSuchWindow),
    row("no such shadow root", 404, ErrorKind::NoSuchShadowRoot),
    row("script timeout", 500, ErrorKind::ScriptTimeout),
    row("session not created", 500, ErrorKind::SessionNotCreated),
    row("stale element reference", 404, ErrorKind::StaleElementReference),
    row("detached shadow root", 404, ErrorKind::DetachedShadowRoot),
    row("timeout", 500, ErrorKind::CommandTimeout),
    row("unable to set cookie", 500, ErrorKind::UnableToSetCookie),
    row("unable to capture screen", 500, ErrorKind::UnableToCaptureScreen),
    row("unexpected alert open", 500, ErrorKind::UnexpectedAlertOpen),
    row("unknown command", 404, ErrorKind::UnknownCommand),
    row("unknown error", 500, ErrorKind::UnknownError),
    row("unknown method", 405, ErrorKind::UnknownMethod),
    row("unsupported operation", 500, ErrorKind::UnsupportedOperation),
];

pub fn lookup(code: &str) -> Option<&'static ErrorMapping> {
    ERROR_TABLE.iter().find(|m| m.code == code)
}

fn get_ignore_case<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_value_gives_empty_envelope() {
        let env = ResponseEnvelope::from_body(200, r#"{"value": null}"#);
        assert!(env.value.is_none());
        assert!(env.session.is_none());
        assert_eq!(env.status, 200);
    }

    #[test]
    fn test_missing_value_gives_empty_envelope() {
        let env = ResponseEnvelope::from_body(204, "{}");
        assert!(env.value.is_none());
        assert_eq!(env.status, 204);
    }

    #[test]
    fn test_session_id_is_lifted() {
        let env = ResponseEnvelope::from_body(200, r#"{"value": {"sessionId": "abc"}}"#);
        assert_eq!(env.session.as_deref(), Some("abc"));
        assert_eq!(env.value, Some(json!({"sessionId": "abc"})));
    }

    #[test]
    fn test_array_value_survives_reserialization() {
        let env = ResponseEnvelope::from_body(200, r#"{"value": [1,2,3]}"#);
        let value = env.value.clone().unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(3));

        let text = serde_json::to_string(&json!({ "value": value })).unwrap();
        let again = ResponseEnvelope::from_body(200, &text);
        assert_eq!(again.value, env.value);
    }

    #[test]
    fn test_scalar_value_kept_verbatim() {
        let env = ResponseEnvelope::from_body(200, r#"{"value": "Example Domain"}"#);
        assert_eq!(env.value, Some(json!("Example Domain")));
        assert!(env.error_record().is_none());
    }

    #[test]
    fn test_malformed_body_does_not_fail() {
        let env = ResponseEnvelope::from_body(502, "<html>Bad Gateway</html>");
        assert!(env.value.is_none());
        assert!(env.session.is_none());
        assert_eq!(env.raw, "<html>Bad Gateway</html>");
    }

    #[test]
    fn test_no_such_element_maps_to_not_found() {
        let body = r#"{"value": {"error": "no such element", "message": "gone", "stacktrace": ""}}"#;
        let err = ResponseEnvelope::from_body(404, body).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchElement);
        assert!(err.kind().is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_known_codes_map_through_table() {
        let cases = [
            ("stale element reference", 404, ErrorKind::StaleElementReference),
            ("invalid argument", 400, ErrorKind::InvalidArgument),
            ("script timeout", 500, ErrorKind::ScriptTimeout),
        ];
        for (code, status, kind) in cases {
            let record = ErrorRecord {
                code: code.to_string(),
                message: String::new(),
                stacktrace: None,
                status,
            };
            assert_eq!(record.into_error().kind(), kind, "{code}");
        }
    }

    #[test]
    fn test_unknown_code_keeps_original_code() {
        let body = r#"{"value": {"error": "flux capacitor overload", "message": "1.21 GW"}}"#;
        let err = ResponseEnvelope::from_body(500, body).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.code(), Some("flux capacitor overload"));
        assert!(err.to_string().contains("1.21 GW"));
    }

    #[test]
    fn test_error_keys_ignore_case() {
        let value = json!({"Error": "no such frame", "Message": "m", "StackTrace": "at x"});
        let record = ErrorRecord::parse(&value, 404).unwrap();
        assert_eq!(record.code, "no such frame");
        assert_eq!(record.stacktrace.as_deref(), Some("at x"));
    }

    #[test]
    fn test_non_success_without_payload_is_protocol_error() {
        let err = ResponseEnvelope::from_body(500, "oops").into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_table_codes_are_unique() {
        for (i, a) in ERROR_TABLE.iter().enumerate() {
            assert!(ERROR_TABLE[i + 1..].iter().all(|b| b.code != a.code), "{}", a.code);
        }
    }

    #[test]
    fn test_code_selects_kind_when_status_disagrees() {
        let body = r#"{"value": {"error": "no such element", "message": "gone"}}"#;
        let err = ResponseEnvelope::from_body(500, body).into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchElement);
        assert_eq!(err.status(), Some(500));
    }
}
