//! Transport-agnostic async JSON-RPC 2.0 client
//!
//! This module provides [`JsonRpcClient`], a channel-backed JSON-RPC 2.0 client
//! that is decoupled from the underlying transport. Callers wire up two
//! [`tokio::sync::mpsc`] channels (one for outbound serialized messages, one
//! for inbound serialized messages) and then call [`start_read_loop`] to
//! process responses concurrently.
//!
//! # Design
//!
//! - Outbound messages are written to `outbound_tx` as newline-free JSON
//!   strings. Framing is the transport's job.
//! - Inbound messages arrive on `inbound_rx`. The read loop resolves
//!   responses, answers server-initiated requests, and logs notifications.
//! - In-flight requests are tracked in a `pending` map keyed by `u64` request
//!   ID. Because responses are matched by ID, several requests may be in
//!   flight on one client at the same time.
//! - A [`CancellationToken`] stops the read loop. When the loop exits for any
//!   reason (cancellation or the peer closing its stream) every pending
//!   request fails with [`TestkitError::Transport`] and later requests fail
//!   immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TestkitError};
use crate::mcp::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, METHOD_NOT_FOUND, METHOD_PING,
};

/// The pending-response map type: maps request ID to the oneshot sender.
type PendingMap =
    HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>>;

/// Transport-agnostic async JSON-RPC 2.0 client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use mcp_testkit::mcp::client::{JsonRpcClient, start_read_loop};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (out_tx, _out_rx) = mpsc::unbounded_channel::<String>();
///     let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
///     let token = CancellationToken::new();
///     let client = Arc::new(JsonRpcClient::new(out_tx));
///     let _handle = start_read_loop(in_rx, token, Arc::clone(&client));
///     Ok(())
/// }
/// ```
pub struct JsonRpcClient {
    /// Monotonically increasing request ID counter.
    next_id: AtomicU64,
    /// In-flight requests waiting for a response.
    pending: Mutex<PendingMap>,
    /// Set once the read loop has exited; no response can arrive after that.
    closed: AtomicBool,
    /// Channel used to send serialized JSON-RPC messages to the transport.
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a new `JsonRpcClient` writing to `outbound_tx`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use mcp_testkit::mcp::client::JsonRpcClient;
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<String>();
    /// let client = JsonRpcClient::new(tx);
    /// assert!(!client.is_closed());
    /// ```
    pub fn new(outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            outbound_tx,
        }
    }

    /// Whether the read loop servicing this client has exited.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a JSON-RPC request and await the typed response.
    ///
    /// # Errors
    ///
    /// - [`TestkitError::Transport`] if the outbound channel is closed or the
    ///   read loop exits before a response arrives.
    /// - [`TestkitError::Timeout`] if no response arrives within `timeout`.
    /// - [`TestkitError::Protocol`] if the server returns an error object;
    ///   code, message, and data are preserved.
    /// - [`TestkitError::Serialization`] if the result does not deserialize.
    pub async fn request<P, R>(&self, method: &str, params: P, timeout: Duration) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register the pending slot before sending so the response can never
        // arrive before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(TestkitError::Transport("connection closed".to_string()).into());
        }

        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        tracing::trace!(id, method, "sending request");
        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(TestkitError::Transport("outbound channel closed".to_string()).into());
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(TestkitError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        };

        // The oneshot was dropped (read loop exited) before a response arrived.
        let rpc_result = outcome.map_err(|_| {
            TestkitError::Transport("connection closed before response arrived".to_string())
        })?;

        let value = rpc_result.map_err(TestkitError::Protocol)?;

        serde_json::from_value(value).map_err(|e| TestkitError::Serialization(e).into())
    }

    /// Send a JSON-RPC notification (no response expected).
    ///
    /// # Errors
    ///
    /// Returns [`TestkitError::Transport`] if the outbound channel is closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use mcp_testkit::mcp::client::JsonRpcClient;
    ///
    /// let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    /// let client = JsonRpcClient::new(tx);
    /// client.notify("notifications/initialized", serde_json::json!({})).unwrap();
    /// assert!(rx.try_recv().unwrap().contains("notifications/initialized"));
    /// ```
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        self.outbound_tx
            .send(message)
            .map_err(|_| TestkitError::Transport("outbound channel closed".to_string()))?;

        Ok(())
    }

    /// Mark the client closed and fail every in-flight request.
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "failing in-flight requests");
        }
        pending.clear();
    }
}

/// Start the JSON-RPC read loop as a background Tokio task.
///
/// The loop reads serialized JSON strings from `inbound_rx` and dispatches
/// them:
///
/// - **Response** (has `"id"` and `"result"` or `"error"`): resolves the
///   matching pending request.
/// - **Server-initiated request** (has `"id"` and `"method"`): `ping` is
///   answered with an empty result, anything else with `-32601`.
/// - **Notification** (has `"method"` but no `"id"`): logged and ignored.
///
/// The loop exits when `cancellation` fires or `inbound_rx` closes. Either
/// way the client is marked closed and pending requests fail.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<JsonRpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_msg = inbound_rx.recv() => {
                    match maybe_msg {
                        Some(raw) => dispatch_message(&raw, &client).await,
                        None => {
                            tracing::debug!("inbound stream closed by peer");
                            break;
                        }
                    }
                }
            }
        }
        client.close().await;
    })
}

/// Classify and dispatch a single inbound JSON string.
async fn dispatch_message(raw: &str, client: &JsonRpcClient) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("read loop: failed to parse inbound JSON: {e}");
            return;
        }
    };

    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_method = value.get("method").is_some();
    let has_result = value.get("result").is_some();
    let has_error = value.get("error").is_some();

    if has_id && (has_result || has_error) && !has_method {
        handle_response(value, client).await;
    } else if has_id && has_method {
        handle_server_request(value, client);
    } else if has_method {
        tracing::debug!(method = %value["method"], "ignoring server notification");
    } else if has_error {
        // Error responses with a null id (e.g. parse errors) cannot be routed.
        tracing::warn!(error = %value["error"], "server reported an uncorrelated error");
    } else {
        tracing::debug!("read loop: received unclassifiable message; ignoring");
    }
}

/// Resolve a pending request sender with the response value or error.
async fn handle_response(value: serde_json::Value, client: &JsonRpcClient) {
    let id_val = &value["id"];
    let id = match id_val
        .as_u64()
        .or_else(|| id_val.as_str().and_then(|s| s.parse::<u64>().ok()))
    {
        Some(id) => id,
        None => {
            tracing::warn!("read loop: response has non-integer id: {id_val}");
            return;
        }
    };

    let Some(tx) = client.pending.lock().await.remove(&id) else {
        tracing::debug!("read loop: received response for unknown id {id}; ignoring");
        return;
    };

    let outcome = match value.get("error") {
        Some(error_val) => Err(serde_json::from_value::<JsonRpcError>(error_val.clone())
            .unwrap_or_else(|_| {
                JsonRpcError::new(INTERNAL_ERROR, format!("malformed error object: {error_val}"))
            })),
        None => Ok(value
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
    };

    // Ignore send errors: the caller may have already timed out.
    let _ = tx.send(outcome);
}

/// Answer a server-initiated request. The harness implements no client
/// capabilities, so only `ping` succeeds.
fn handle_server_request(value: serde_json::Value, client: &JsonRpcClient) {
    let method = value["method"].as_str().unwrap_or_default();
    let id = value["id"].clone();

    let response = if method == METHOD_PING {
        JsonRpcResponse::success(id, serde_json::json!({}))
    } else {
        tracing::debug!(method, "rejecting unsupported server request");
        JsonRpcResponse::failure(
            id,
            JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {method}")),
        )
    };

    if let Ok(serialized) = serde_json::to_string(&response) {
        let _ = client.outbound_tx.send(serialized);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
