//! MCP transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that carries serialized
//! JSON-RPC messages between a [`crate::session::Session`] and a server.
//! Concrete implementations live in submodules:
//!
//! - [`stdio::StdioTransport`] -- spawns a child process and communicates
//!   over its stdin/stdout pipes (newline-delimited JSON).
//! - [`fake::FakeTransport`] -- in-process channel pair used by unit tests
//!   and by [`crate::mock::MockServer`].
//!
//! Callers `send` one serialized message at a time and `receive` a stream of
//! inbound messages. Framing is the responsibility of each implementation.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// Abstraction over MCP transport implementations.
///
/// Used polymorphically through `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a complete JSON-RPC message string to the remote peer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TestkitError::Transport`] if the peer is gone.
    async fn send(&self, message: String) -> Result<()>;

    /// Returns a stream of inbound JSON-RPC message strings.
    ///
    /// The stream ends when the remote peer closes its side or the transport
    /// is terminated.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Tear the connection down without waiting for the peer to exit.
    ///
    /// Must not block and must be safe to call more than once.
    fn terminate(&self);
}

pub mod fake;
pub mod stdio;
