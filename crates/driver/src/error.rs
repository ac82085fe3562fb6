//! Error taxonomy for the protocol engine
//!
//! Flat enum, one variant per failure family. Server-reported failures carry
//! a table-mapped [`ErrorKind`] so callers branch on kind, never on message text.

use std::time::Duration;

use thiserror::Error;

use crate::cdp::client::CdpError;

pub type Result<T> = std::result::Result<T, WebDriverError>;

/// Kind of failure, stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection refused, DNS failure, socket IO.
    Transport,
    /// A wait or CDP call deadline elapsed.
    Timeout,
    /// Malformed or unexpected response shape, or an unrecognized server code.
    Protocol,
    /// The driver executable never reported ready.
    ServiceNotReady,
    /// Caller mistake: unresolved placeholder, missing session, unknown command.
    Usage,

    ElementClickIntercepted,
    ElementNotInteractable,
    InsecureCertificate,
    InvalidArgument,
    InvalidCookieDomain,
    InvalidElementState,
    InvalidSelector,
    InvalidSessionId,
    JavascriptError,
    MoveTargetOutOfBounds,
    NoSuchAlert,
    NoSuchCookie,
    NoSuchElement,
    NoSuchFrame,
    NoSuchWindow,
    NoSuchShadowRoot,
    ScriptTimeout,
    SessionNotCreated,
    StaleElementReference,
    DetachedShadowRoot,
    CommandTimeout,
    UnableToSetCookie,
    UnableToCaptureScreen,
    UnexpectedAlertOpen,
    UnknownCommand,
    UnknownError,
    UnknownMethod,
    UnsupportedOperation,
}

impl ErrorKind {
    /// True for the "not found" family (element, frame, window, alert, cookie, shadow root).
    pub fn is_not_found(self) -> bool {
        matches!(
            self,
            ErrorKind::NoSuchElement
                | ErrorKind::NoSuchFrame
                | ErrorKind::NoSuchWindow
                | ErrorKind::NoSuchAlert
                | ErrorKind::NoSuchCookie
                | ErrorKind::NoSuchShadowRoot
        )
    }

    /// True for kinds that represent an elapsed deadline, client or server side.
    pub fn is_timeout(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ScriptTimeout | ErrorKind::CommandTimeout
        )
    }
}

#[derive(Error, Debug)]
pub enum WebDriverError {
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    #[error("server error '{code}' (HTTP {status}): {message}")]
    Server {
        kind: ErrorKind,
        code: String,
        message: String,
        stacktrace: Option<String>,
        status: u16,
    },

    #[error("unrecognized server error '{code}' (HTTP {status}): {message}")]
    UnrecognizedServerError {
        code: String,
        message: String,
        status: u16,
    },

    #[error("driver service at {url} did not become ready within {timeout:?}")]
    ServiceNotReady { url: String, timeout: Duration },

    #[error("driver service exited before becoming ready: {status}")]
    ServiceExited { status: String },

    #[error("unresolved placeholder $[{placeholder}] in route {route}")]
    UnresolvedPlaceholder { route: String, placeholder: String },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("no active session")]
    NoSession,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

impl WebDriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebDriverError::Transport { .. } | WebDriverError::Io(_) => ErrorKind::Transport,
            WebDriverError::Timeout { .. } => ErrorKind::Timeout,
            WebDriverError::Protocol { .. }
            | WebDriverError::UnrecognizedServerError { .. }
            | WebDriverError::Json(_) => ErrorKind::Protocol,
            WebDriverError::Server { kind, .. } => *kind,
            WebDriverError::ServiceNotReady { .. } | WebDriverError::ServiceExited { .. } => {
                ErrorKind::ServiceNotReady
            }
            WebDriverError::UnresolvedPlaceholder { .. }
            | WebDriverError::UnknownCommand(_)
            | WebDriverError::NoSession
            | WebDriverError::Config(_) => ErrorKind::Usage,
            WebDriverError::Cdp(e) => e.kind(),
        }
    }

    /// Wire error code reported by the server, when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            WebDriverError::Server { code, .. }
            | WebDriverError::UnrecognizedServerError { code, .. } => Some(code),
            _ => None,
        }
    }

    /// HTTP status of the failing response, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            WebDriverError::Server { status, .. }
            | WebDriverError::UnrecognizedServerError { status, .. } => Some(*status),
            WebDriverError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        WebDriverError::Protocol {
            detail: detail.into(),
        }
    }

    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        WebDriverError::Transport {
            url: url.into(),
            source,
        }
    }
}
