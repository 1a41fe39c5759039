//! Error types for mcp-testkit
//!
//! Every failure a session, transport, assertion, or mock can produce is a
//! variant of [`TestkitError`]. Public operations return [`Result`], an
//! `anyhow` alias, so callers that need the typed error recover it with
//! `downcast_ref::<TestkitError>()` or the [`protocol_error`] helper.

use thiserror::Error;

use crate::mcp::types::JsonRpcError;

/// Main error type for mcp-testkit operations
#[derive(Error, Debug)]
pub enum TestkitError {
    /// Invalid or unsupported session configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server process could not be started or its pipes are missing
    #[error("Launch error: {0}")]
    Launch(String),

    /// A remote call was issued before `connect()`
    #[error("Client is not connected. Call connect() first.")]
    NotConnected,

    /// `connect()` was called on a session that is already connected
    #[error("Client is already connected. Call disconnect() first.")]
    AlreadyConnected,

    /// The server answered with a JSON-RPC error object
    #[error("Protocol error {}: {}", .0.code, .0.message)]
    Protocol(JsonRpcError),

    /// Transport-level failure (peer closed, channel closed, read loop exited)
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response arrived before the configured deadline
    #[error("Timed out after {timeout_ms}ms waiting for `{method}`")]
    Timeout {
        /// JSON-RPC method that timed out
        method: String,
        /// Deadline that was exceeded
        timeout_ms: u64,
    },

    /// The server negotiated a protocol revision this client cannot speak
    #[error("Unsupported protocol version: expected one of {expected:?}, got {got}")]
    ProtocolVersion {
        /// Versions this client accepts
        expected: Vec<String>,
        /// Version the server returned
        got: String,
    },

    /// The server replied with a well-formed result the harness cannot use
    #[error("Invalid response to `{method}`: {reason}")]
    InvalidResponse {
        /// JSON-RPC method that was answered
        method: String,
        /// What was wrong with the result
        reason: String,
    },

    /// A structural assertion over server data failed
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for mcp-testkit operations
pub type Result<T> = anyhow::Result<T>;

/// Returns the server-side JSON-RPC error carried by `err`, if any.
///
/// # Examples
///
/// ```
/// use mcp_testkit::error::{protocol_error, TestkitError};
/// use mcp_testkit::mcp::types::JsonRpcError;
///
/// let err: anyhow::Error = TestkitError::Protocol(JsonRpcError {
///     code: -32602,
///     message: "Division by zero".to_string(),
///     data: None,
/// })
/// .into();
/// assert_eq!(protocol_error(&err).map(|e| e.code), Some(-32602));
/// ```
pub fn protocol_error(err: &anyhow::Error) -> Option<&JsonRpcError> {
    match err.downcast_ref::<TestkitError>() {
        Some(TestkitError::Protocol(e)) => Some(e),
        _ => None,
    }
}
