//! In-process fake transport
//!
//! This module provides [`FakeTransport`] and [`FakeTransportHandle`], an
//! in-process pair that replaces process I/O. It backs the unit tests of
//! the session layer and lets [`crate::mock::MockServer`] serve a
//! [`crate::session::Session`] without spawning anything.
//!
//! # Channel Wiring
//!
//! From the **session** perspective:
//!
//! - "outbound" = what the session *sends* = what the peer reads via
//!   `handle.outbound_rx`.
//! - "inbound"  = what the session *receives* = what the peer injects via
//!   `handle.inbound_tx`.
//!
//! ```text
//! session send() ----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -> inbound_tx  -----> inbound_rx  (session receive())
//! ```
//!
//! # Example
//!
//! ```
//! use mcp_testkit::mcp::transport::fake::FakeTransport;
//! use mcp_testkit::mcp::transport::Transport;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (transport, mut handle) = FakeTransport::new();
//!
//! transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#.to_string()).await.unwrap();
//! let sent = handle.outbound_rx.recv().await.unwrap();
//! assert!(sent.contains("ping"));
//!
//! handle.inbound_tx.send(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string()).unwrap();
//! use futures::StreamExt;
//! let received = transport.receive().next().await.unwrap();
//! assert!(received.contains("result"));
//! # }
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TestkitError};
use crate::mcp::transport::Transport;

/// In-process transport backed by unbounded channels.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Cancelled by `terminate` or by the handle; ends the receive stream.
    closed: CancellationToken,
    terminated: Arc<AtomicBool>,
}

/// Peer side of a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the session sent.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Push messages the session will receive.
    pub inbound_tx: mpsc::UnboundedSender<String>,
    closed: CancellationToken,
    terminated: Arc<AtomicBool>,
}

impl FakeTransportHandle {
    /// Whether the session side called [`Transport::terminate`].
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Hang up: the transport's receive stream ends and `send` fails.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let terminated = Arc::new(AtomicBool::new(false));
        let closed = CancellationToken::new();

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            closed: closed.clone(),
            terminated: Arc::clone(&terminated),
        };

        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            closed,
            terminated,
        };

        (transport, handle)
    }

    /// Two transports wired back to back.
    ///
    /// What one end sends, the other receives. Terminating either end
    /// closes both, like a pipe whose reader went away.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel::<String>();
        let (b_tx, a_rx) = mpsc::unbounded_channel::<String>();
        let closed = CancellationToken::new();

        let a = Self {
            outbound_tx: a_tx,
            inbound_rx: Arc::new(Mutex::new(a_rx)),
            closed: closed.clone(),
            terminated: Arc::new(AtomicBool::new(false)),
        };
        let b = Self {
            outbound_tx: b_tx,
            inbound_rx: Arc::new(Mutex::new(b_rx)),
            closed,
            terminated: Arc::new(AtomicBool::new(false)),
        };
        (a, b)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TestkitError::Transport("fake transport terminated".into()).into());
        }
        self.outbound_tx
            .send(message)
            .map_err(|_| TestkitError::Transport("fake outbound channel closed".into()).into())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        let closed = self.closed.clone();
        Box::pin(futures::stream::unfold(
            (rx, closed),
            |(rx, closed)| async move {
                let item = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        biased;
                        _ = closed.cancelled() => None,
                        item = guard.recv() => item,
                    }
                }?;
                Some((item, (rx, closed)))
            },
        ))
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_reaches_handle() {
        let (transport, mut handle) = FakeTransport::new();
        transport.send("hello".to_string()).await.unwrap();
        assert_eq!(handle.outbound_rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_receive_preserves_order() {
        let (transport, handle) = FakeTransport::new();
        for i in 0..3 {
            handle.inbound_tx.send(format!("m{i}")).unwrap();
        }
        let mut stream = transport.receive();
        for i in 0..3 {
            assert_eq!(stream.next().await.unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_terminate_ends_stream_and_rejects_send() {
        let (transport, handle) = FakeTransport::new();
        let mut stream = transport.receive();
        transport.terminate();

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should end promptly");
        assert!(next.is_none());
        assert!(handle.is_terminated());
        assert!(transport.send("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_handle_close_ends_stream_without_terminating() {
        let (transport, handle) = FakeTransport::new();
        handle.close();
        assert!(transport.receive().next().await.is_none());
        assert!(!handle.is_terminated());
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_send_fails_when_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);
        assert!(transport.send("x".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_pair_is_crossed_and_closes_together() {
        let (left, right) = FakeTransport::pair();
        left.send("to-right".to_string()).await.unwrap();
        right.send("to-left".to_string()).await.unwrap();
        assert_eq!(right.receive().next().await.unwrap(), "to-right");
        assert_eq!(left.receive().next().await.unwrap(), "to-left");

        left.terminate();
        assert!(right.receive().next().await.is_none());
    }

    #[test]
    fn test_is_object_safe() {
        let (transport, _handle) = FakeTransport::new();
        let _boxed: Arc<dyn Transport> = Arc::new(transport);
    }
}
