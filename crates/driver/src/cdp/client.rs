//! CDP connection - WebSocket RPC with correlation ids
//!
//! One socket per connection. Replies are matched to callers by request id;
//! events are broadcast to subscribers by method name. Each call is bounded by
//! the connection timeout, never by the lifetime of the socket.
//!
//! A frame that is not JSON never fails the caller: the oldest in-flight call
//! receives a synthesized `{"Error": ..., "Raw": ...}` document instead.
//!
//! The id counter and socket are private to one connection. Interleaving calls
//! from several tasks is the caller's business to serialize.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::*;
use crate::error::ErrorKind;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i64, message: String },

    /// A frame that did not parse; `raw` is the payload as received.
    #[error("malformed CDP frame: {error}")]
    Malformed { error: String, raw: String },

    #[error("{method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Connection closed")]
    Closed,

    #[error("Not connected")]
    NotConnected,

    #[error("reply to {method} has no '{field}'")]
    MissingField { method: String, field: String },
}

impl CdpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CdpError::WebSocket(_) | CdpError::Closed => ErrorKind::Transport,
            CdpError::Json(_)
            | CdpError::Protocol { .. }
            | CdpError::Malformed { .. }
            | CdpError::MissingField { .. } => ErrorKind::Protocol,
            CdpError::Timeout { .. } => ErrorKind::Timeout,
            CdpError::NotConnected => ErrorKind::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(CdpEvent) + Send + Sync>;

type Pending = DashMap<RequestId, oneshot::Sender<Value>>;
type Subscribers = DashMap<String, Vec<EventCallback>>;

pub struct CdpConnection {
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
    pending: Arc<Pending>,
    subscribers: Arc<Subscribers>,
    /// `None` until opened and after disconnect.
    ws_sink: RwLock<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CdpConnection {
    /// A connection that has not opened its socket yet.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            ws_sink: RwLock::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Per-call deadline for every later send.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open a connection to a debugger WebSocket URL.
    pub async fn connect(url: impl Into<String>) -> Result<Arc<Self>> {
        let connection = Self::new(url);
        connection.open().await?;
        Ok(Arc::new(connection))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn is_open(&self) -> bool {
        self.ws_sink.read().await.is_some()
    }

    /// Open the socket and start the receive loop. A no-op when already open.
    pub async fn open(&self) -> Result<()> {
        let mut sink_slot = self.ws_sink.write().await;
        if sink_slot.is_some() {
            return Ok(());
        }

        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (sink, stream) = ws_stream.split();
        *sink_slot = Some(sink);

        let task = tokio::spawn(receive_loop(
            stream,
            self.pending.clone(),
            self.subscribers.clone(),
        ));
        *self.reader.lock().await = Some(task);

        tracing::info!(url = %self.url, "CDP connection opened");
        Ok(())
    }

    /// Send a command and return the whole reply document: `{id, result}`,
    /// `{id, error}`, or the synthesized malformed-frame document.
    pub async fn send_command(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        let method = method.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.clone(),
            params,
            session_id,
        };
        let json = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut sink = self.ws_sink.write().await;
            let Some(sink) = sink.as_mut() else {
                self.pending.remove(&id);
                return Err(CdpError::NotConnected);
            };
            if let Err(e) = sink.send(Message::Text(json)).await {
                self.pending.remove(&id);
                return Err(e.into());
            }
        }

        tracing::debug!(id, method = %method, "sent CDP command");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(document)) => Ok(document),
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(CdpError::Timeout {
                    method,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Send a command and return its `result`, mapping error documents to
    /// [`CdpError`].
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        let document = self.send_command(method, params, session_id).await?;
        into_result(document)
    }

    /// Subscribe to CDP events
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
        self.subscribers
            .entry(method.into())
            .or_default()
            .push(callback);
    }

    /// Attach to a target in flat mode and return its session id.
    pub async fn attach_to_target(&self, target_id: &str) -> Result<SessionId> {
        let result = self
            .send_request(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
            )
            .await?;
        result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CdpError::MissingField {
                method: "Target.attachToTarget".to_string(),
                field: "sessionId".to_string(),
            })
    }

    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>> {
        let mut result = self.send_request("Target.getTargets", None, None).await?;
        let infos = result
            .get_mut("targetInfos")
            .map(Value::take)
            .ok_or_else(|| CdpError::MissingField {
                method: "Target.getTargets".to_string(),
                field: "targetInfos".to_string(),
            })?;
        Ok(serde_json::from_value(infos)?)
    }

    /// Close gracefully. Safe on a connection that never opened or is
    /// already closed.
    pub async fn disconnect(&self) -> Result<()> {
        let sink = self.ws_sink.write().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!(url = %self.url, error = %e, "close handshake failed");
            }
            tracing::info!(url = %self.url, "CDP connection closed");
        }
        if let Some(task) = self.reader.lock().await.take() {
            task.abort();
        }
        self.pending.clear();
        Ok(())
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        if let Some(task) = self.reader.get_mut().take() {
            task.abort();
        }
        if let Some(mut sink) = self.ws_sink.get_mut().take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sink.close().await;
                });
            }
        }
    }
}

impl std::fmt::Debug for CdpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpConnection")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Map a reply document to its `result`.
pub fn into_result(mut document: Value) -> Result<Value> {
    if let Some(error) = document.get("Error") {
        return Err(CdpError::Malformed {
            error: error.as_str().unwrap_or_default().to_string(),
            raw: document
                .get("Raw")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    if let Some(fault) = document.get_mut("error").map(Value::take) {
        let fault: CdpFault = serde_json::from_value(fault)?;
        return Err(CdpError::Protocol {
            code: fault.code,
            message: fault.message,
        });
    }
    Ok(document
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<Pending>,
    subscribers: Arc<Subscribers>,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => dispatch(&text, &pending, &subscribers),
            Ok(Message::Binary(bytes)) => {
                dispatch(&String::from_utf8_lossy(&bytes), &pending, &subscribers)
            }
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Dropping the senders wakes every waiter with Closed
    pending.clear();
}

fn dispatch(text: &str, pending: &Pending, subscribers: &Subscribers) {
    let document: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            let oldest = pending.iter().map(|entry| *entry.key()).min();
            tracing::warn!(error = %e, waiting = ?oldest, "malformed CDP frame");
            if let Some((_, tx)) = oldest.and_then(|id| pending.remove(&id)) {
                let _ = tx.send(malformed_frame(&e.to_string(), text));
            }
            return;
        }
    };

    if let Some(id) = document.get("id").and_then(Value::as_u64) {
        match pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(document);
            }
            None => tracing::warn!(id, "Received response for unknown request"),
        }
        return;
    }

    match serde_json::from_value::<CdpEvent>(document) {
        Ok(event) => {
            if let Some(callbacks) = subscribers.get(&event.method) {
                for callback in callbacks.value() {
                    callback(event.clone());
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "frame is neither reply nor event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    /// Mock browser: answers each request through `reply`, which gets the
    /// parsed request and returns the frames to send back.
    async fn mock_browser<F>(reply: F) -> String
    where
        F: Fn(Value) -> Vec<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let request: Value = serde_json::from_str(&text).unwrap();
                    for frame in reply(request) {
                        ws.send(Message::Text(frame)).await.unwrap();
                    }
                }
            }
        });
        format!("ws://{addr}")
    }

    fn echo_id(request: Value) -> Vec<String> {
        vec![json!({ "id": request["id"], "result": { "echo": request["id"] } }).to_string()]
    }

    #[tokio::test]
    async fn test_sequential_sends_get_increasing_ids() {
        let url = mock_browser(echo_id).await;
        let connection = CdpConnection::connect(url).await.unwrap();

        let first = connection.send_request("Browser.getVersion", None, None).await.unwrap();
        let second = connection.send_request("Browser.getVersion", None, None).await.unwrap();

        let first = first["echo"].as_u64().unwrap();
        let second = second["echo"].as_u64().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_error_document() {
        let url = mock_browser(|_| vec!["this is {not json".to_string()]).await;
        let connection = CdpConnection::connect(url).await.unwrap();

        let document = connection
            .send_command("Target.getTargets", None, None)
            .await
            .unwrap();

        assert!(document.get("Error").is_some());
        assert_eq!(document["Raw"], "this is {not json");

        let err = into_result(document).unwrap_err();
        assert!(matches!(err, CdpError::Malformed { .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_protocol_error_maps_code_and_message() {
        let url = mock_browser(|request| {
            vec![json!({
                "id": request["id"],
                "error": { "code": -32601, "message": "'Nope.nope' wasn't found" }
            })
            .to_string()]
        })
        .await;
        let connection = CdpConnection::connect(url).await.unwrap();

        let err = connection.send_request("Nope.nope", None, None).await.unwrap_err();
        match err {
            CdpError::Protocol { code, message } => {
                assert_eq!(code, -32601);
                assert!(message.contains("Nope.nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_times_out_without_reply() {
        let url = mock_browser(|_| Vec::new()).await;
        let connection = CdpConnection::new(url).with_timeout(Duration::from_millis(200));
        connection.open().await.unwrap();

        let err = connection
            .send_request("Page.enable", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(connection.pending.is_empty());
    }

    #[tokio::test]
    async fn test_attach_and_get_targets_extract_fields() {
        let url = mock_browser(|request| {
            let result = match request["method"].as_str().unwrap() {
                "Target.attachToTarget" => json!({ "sessionId": "S-1" }),
                _ => json!({ "targetInfos": [
                    { "targetId": "T-1", "type": "page", "title": "a", "url": "about:blank", "attached": false }
                ]}),
            };
            vec![json!({ "id": request["id"], "result": result }).to_string()]
        })
        .await;
        let connection = CdpConnection::connect(url).await.unwrap();

        assert_eq!(connection.attach_to_target("T-1").await.unwrap(), "S-1");
        let targets = connection.get_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_type, "page");
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let url = mock_browser(|request| {
            vec![
                json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.0 } }).to_string(),
                json!({ "id": request["id"], "result": {} }).to_string(),
            ]
        })
        .await;
        let connection = CdpConnection::connect(url).await.unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        connection.subscribe(
            "Page.loadEventFired",
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        connection.send_request("Page.enable", None, None).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_never_opened() {
        let connection = CdpConnection::new("ws://127.0.0.1:1");
        assert_ok!(connection.disconnect().await);
        assert_ok!(connection.disconnect().await);

        let err = connection.send_request("Page.enable", None, None).await.unwrap_err();
        assert!(matches!(err, CdpError::NotConnected));
    }
}
