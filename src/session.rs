//! Connection lifecycle and typed call surface for one server under test
//!
//! A [`Session`] owns at most one live connection: a transport (normally a
//! spawned child process), the JSON-RPC client multiplexing requests over it,
//! and the background tasks bridging the two.
//!
//! ```text
//! Session::connect
//!   -> StdioTransport::spawn (merged environment)
//!   -> outbound bridge: client channel -> transport.send
//!   -> inbound bridge:  transport.receive -> read loop
//!   -> initialize / notifications/initialized
//! ```
//!
//! Every operation takes `&self`. Share a session through `Arc<Session>` to
//! issue overlapping calls or to disconnect while a call is in flight; the
//! pending call then fails with [`TestkitError::Transport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{SessionConfig, TransportKind};
use crate::error::{Result, TestkitError};
use crate::mcp::client::{start_read_loop, JsonRpcClient};
use crate::mcp::protocol::{InitializedMcpProtocol, McpProtocol, ServerCapabilityFlag};
use crate::mcp::transport::stdio::{LaunchOptions, StdioTransport};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    CallToolResult, ClientCapabilities, Implementation, PromptDescriptor, ResourceContents,
    ResourceDescriptor, ServerInfo, ToolDescriptor, METHOD_RESOURCES_READ,
};

/// One live connection. Dropping it tears everything down.
#[derive(Debug)]
struct Connection {
    protocol: InitializedMcpProtocol,
    transport: Arc<dyn Transport>,
    cancellation: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Wire `transport` to a fresh client and run the handshake.
    ///
    /// The connection's token is a child of `abort`, so cancelling `abort`
    /// fails an in-flight handshake. On failure the transport is terminated
    /// before the error is returned.
    async fn open(
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
        abort: &CancellationToken,
    ) -> Result<Self> {
        let cancellation = abort.child_token();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let client = Arc::new(JsonRpcClient::new(outbound_tx));

        let outbound = {
            let transport = Arc::clone(&transport);
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => break,
                        msg = outbound_rx.recv() => match msg {
                            Some(msg) => {
                                if let Err(e) = transport.send(msg).await {
                                    tracing::debug!("outbound bridge stopped: {e}");
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            })
        };

        let inbound = {
            let transport = Arc::clone(&transport);
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                let mut stream = transport.receive();
                loop {
                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => break,
                        msg = stream.next() => match msg {
                            Some(msg) => {
                                if inbound_tx.send(msg).is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            })
        };

        let read_loop = start_read_loop(inbound_rx, cancellation.clone(), Arc::clone(&client));
        let tasks = vec![outbound, inbound, read_loop];

        let handshake = McpProtocol::new(client, Duration::from_millis(config.timeout_ms))
            .initialize(
                Implementation {
                    name: config.client_name.clone(),
                    version: config.client_version.clone(),
                    title: None,
                },
                ClientCapabilities::default(),
            )
            .await;

        match handshake {
            Ok(protocol) => Ok(Self {
                protocol,
                transport,
                cancellation,
                tasks,
            }),
            Err(e) => {
                cancellation.cancel();
                transport.terminate();
                Err(e)
            }
        }
    }

    /// Whether the peer is still reachable.
    fn is_alive(&self) -> bool {
        !self.cancellation.is_cancelled() && !self.protocol.is_closed()
    }

    /// Fail pending calls, stop the bridges and terminate the peer.
    fn shutdown(&self) {
        self.cancellation.cancel();
        self.transport.terminate();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Default)]
enum State {
    #[default]
    Disconnected,
    /// A handshake is in flight; cancelling the token aborts it.
    Connecting(CancellationToken),
    Connected(Arc<Connection>),
}

/// A connection to one MCP server under test.
///
/// # Examples
///
/// ```no_run
/// use mcp_testkit::{Session, SessionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let session = Session::new(SessionConfig::new("node").arg("server.js"));
/// session.connect().await?;
/// let tools = session.list_tools().await?;
/// println!("{} tools", tools.len());
/// session.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: Mutex<State>,
}

impl Session {
    /// Create a session. Nothing is spawned until [`Session::connect`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Disconnected),
        }
    }

    /// The configuration captured at construction.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether a connection is live.
    ///
    /// Turns `false` as soon as the server goes away, without waiting for
    /// [`Session::disconnect`].
    pub fn is_connected(&self) -> bool {
        matches!(&*self.state(), State::Connected(c) if c.is_alive())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the server process and perform the handshake.
    ///
    /// A previous connection whose server has gone away is cleaned up first.
    ///
    /// # Errors
    ///
    /// - [`TestkitError::AlreadyConnected`] if a connection is live or a
    ///   connect is already in progress.
    /// - [`TestkitError::Config`] for a non-stdio transport or an invalid
    ///   configuration. No process is spawned.
    /// - [`TestkitError::Launch`] if the process cannot be started.
    /// - Any handshake failure ([`TestkitError::Timeout`],
    ///   [`TestkitError::Transport`], [`TestkitError::Protocol`],
    ///   [`TestkitError::ProtocolVersion`]). The process is terminated first.
    /// - [`TestkitError::Transport`] if [`Session::disconnect`] is called
    ///   before the handshake completes.
    pub async fn connect(&self) -> Result<()> {
        let abort = self.begin_connect()?;
        let outcome = self.open_stdio(&abort).await;
        self.finish_connect(&abort, outcome)
    }

    async fn open_stdio(&self, abort: &CancellationToken) -> Result<Connection> {
        if self.config.transport != TransportKind::Stdio {
            return Err(TestkitError::Config(format!(
                "unsupported transport `{}`; only stdio is supported",
                self.config.transport
            ))
            .into());
        }
        self.config.validate()?;

        let options = LaunchOptions {
            command: self.config.command.clone(),
            args: self.config.args.clone(),
            env: self.config.effective_environment(std::env::vars_os()),
            working_dir: self.config.working_dir.clone(),
            debug: self.config.debug,
        };
        let transport: Arc<dyn Transport> = Arc::new(StdioTransport::spawn(&options)?);

        Connection::open(transport, &self.config, abort).await
    }

    /// Perform the handshake over an already established transport.
    ///
    /// Used to attach a session to an in-process peer such as
    /// [`crate::mock::MockServer`]. The configured command and transport
    /// kind are ignored; `timeout_ms` still applies.
    ///
    /// # Errors
    ///
    /// Same as [`Session::connect`], minus launch failures.
    pub async fn connect_transport(&self, transport: Arc<dyn Transport>) -> Result<()> {
        let abort = self.begin_connect()?;
        let outcome = if self.config.timeout_ms == 0 {
            transport.terminate();
            Err(TestkitError::Config("timeout_ms must be greater than 0".to_string()).into())
        } else {
            Connection::open(transport, &self.config, &abort).await
        };
        self.finish_connect(&abort, outcome)
    }

    /// Claim the lifecycle for a new connection attempt.
    fn begin_connect(&self) -> Result<CancellationToken> {
        let mut state = self.state();
        match &*state {
            State::Connected(c) if c.is_alive() => {
                return Err(TestkitError::AlreadyConnected.into())
            }
            State::Connecting(_) => return Err(TestkitError::AlreadyConnected.into()),
            State::Connected(c) => {
                tracing::debug!("discarding connection to departed server");
                c.shutdown();
            }
            State::Disconnected => {}
        }
        let abort = CancellationToken::new();
        *state = State::Connecting(abort.clone());
        Ok(abort)
    }

    /// Publish the outcome of a connection attempt.
    ///
    /// If `disconnect` ran while the attempt was in flight, `abort` is
    /// cancelled and the state already belongs to someone else.
    fn finish_connect(&self, abort: &CancellationToken, outcome: Result<Connection>) -> Result<()> {
        let mut state = self.state();
        if abort.is_cancelled() {
            // Dropping the connection terminates it.
            drop(outcome?);
            return Err(
                TestkitError::Transport("disconnected while connecting".to_string()).into(),
            );
        }

        match outcome {
            Ok(connection) => {
                let info = connection.protocol.server_info();
                tracing::info!(
                    server = %info.server_info.name,
                    version = %info.server_info.version,
                    protocol = %info.protocol_version,
                    "connected"
                );
                *state = State::Connected(Arc::new(connection));
                Ok(())
            }
            Err(e) => {
                *state = State::Disconnected;
                Err(e)
            }
        }
    }

    /// Close the connection and terminate the server.
    ///
    /// A no-op when not connected. Never fails and never waits for the
    /// process to exit. Calls still in flight fail with
    /// [`TestkitError::Transport`], and so does a [`Session::connect`] that
    /// is still performing its handshake.
    pub async fn disconnect(&self) {
        let previous = std::mem::take(&mut *self.state());
        match previous {
            State::Disconnected => {}
            State::Connecting(abort) => {
                abort.cancel();
                tracing::info!("connect aborted");
            }
            State::Connected(connection) => {
                connection.shutdown();
                tracing::info!("disconnected");
            }
        }
    }

    /// The live connection, or an error explaining why there is none.
    ///
    /// A connection whose server has gone away is cleaned up here and
    /// reported as [`TestkitError::Transport`]; later calls see
    /// [`TestkitError::NotConnected`].
    fn live(&self) -> Result<Arc<Connection>> {
        let mut state = self.state();
        let connection = match &*state {
            State::Connected(c) => Arc::clone(c),
            _ => return Err(TestkitError::NotConnected.into()),
        };
        if connection.is_alive() {
            return Ok(connection);
        }

        *state = State::Disconnected;
        connection.shutdown();
        tracing::info!("server connection lost");
        Err(TestkitError::Transport("server connection closed".to_string()).into())
    }

    /// List every tool the server exposes. Empty when it reports none.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.live()?.protocol.list_tools().await
    }

    /// Invoke a tool.
    ///
    /// `arguments` must be a JSON object or `null` (no arguments).
    ///
    /// # Errors
    ///
    /// A JSON-RPC error from the server surfaces as
    /// [`TestkitError::Protocol`] with code, message and data unchanged.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn demo(session: &mcp_testkit::Session) -> anyhow::Result<()> {
    /// let result = session
    ///     .call_tool("echo", serde_json::json!({ "message": "hi" }))
    ///     .await?;
    /// assert_eq!(result.text_content(), "hi");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult> {
        let connection = self.live()?;
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(TestkitError::Config(format!(
                    "arguments for tool `{}` must be a JSON object, got {}",
                    name, other
                ))
                .into())
            }
        };
        connection.protocol.call_tool(name, arguments).await
    }

    /// List every resource the server exposes.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.live()?.protocol.list_resources().await
    }

    /// Read a resource, returning the first content entry.
    ///
    /// # Errors
    ///
    /// [`TestkitError::InvalidResponse`] if the server returns no contents.
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        let response = self.live()?.protocol.read_resource(uri).await?;
        response.contents.into_iter().next().ok_or_else(|| {
            TestkitError::InvalidResponse {
                method: METHOD_RESOURCES_READ.to_string(),
                reason: format!("no contents returned for `{}`", uri),
            }
            .into()
        })
    }

    /// List every prompt the server exposes.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.live()?.protocol.list_prompts().await
    }

    /// Render a prompt. The result is returned exactly as the server sent it.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<serde_json::Value> {
        self.live()?.protocol.get_prompt(name, arguments).await
    }

    /// Protocol version, capabilities and identity negotiated during
    /// [`Session::connect`].
    pub async fn get_server_info(&self) -> Result<ServerInfo> {
        Ok(self.live()?.protocol.server_info().clone())
    }

    /// Whether the server advertised `capability` during the handshake.
    pub fn supports(&self, capability: ServerCapabilityFlag) -> Result<bool> {
        Ok(self.live()?.protocol.capable(capability))
    }

    /// Round-trip a `ping`.
    pub async fn ping(&self) -> Result<()> {
        self.live()?.protocol.ping().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        match std::mem::take(state) {
            State::Connected(connection) => connection.shutdown(),
            State::Connecting(abort) => abort.cancel(),
            State::Disconnected => {}
        }
    }
}
