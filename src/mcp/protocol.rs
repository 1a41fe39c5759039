//! Typed MCP lifecycle wrapper over [`JsonRpcClient`]
//!
//! This module provides two types that represent the two phases of an MCP
//! client session:
//!
//! - [`McpProtocol`] -- an uninitialized client. Call
//!   [`McpProtocol::initialize`] to perform the `initialize` /
//!   `notifications/initialized` handshake and receive an
//!   [`InitializedMcpProtocol`].
//! - [`InitializedMcpProtocol`] -- a negotiated session exposing `tools/*`,
//!   `resources/*`, `prompts/*`, and `ping` as typed async methods.
//!
//! List methods follow `nextCursor` until the server stops returning one and
//! return the accumulated items.
//!
//! Neither type owns a transport; callers wire up channels externally and
//! pass the resulting [`JsonRpcClient`] into [`McpProtocol::new`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{Result, TestkitError};
use crate::mcp::client::JsonRpcClient;
use crate::mcp::types::{
    CallToolParams, CallToolResult, ClientCapabilities, GetPromptParams, Implementation,
    InitializeParams, ListPromptsResponse, ListResourcesResponse, ListToolsResponse,
    PaginatedParams, PromptDescriptor, ReadResourceParams, ReadResourceResponse,
    ResourceDescriptor, ServerInfo, ToolDescriptor, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_PING, METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST,
    METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Upper bound on pages fetched by one list call; guards against a server
/// that keeps returning the same cursor.
const MAX_PAGES: usize = 1000;

/// Identifies a capability a server may advertise during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCapabilityFlag {
    /// Server exposes tools via `tools/list` and `tools/call`.
    Tools,
    /// Server exposes resources via `resources/list` and `resources/read`.
    Resources,
    /// Server exposes prompts via `prompts/list` and `prompts/get`.
    Prompts,
    /// Server supports `logging/setLevel` and log notifications.
    Logging,
    /// Server supports `completion/complete`.
    Completions,
}

/// An uninitialized MCP client session.
#[derive(Debug)]
pub struct McpProtocol {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
}

impl McpProtocol {
    /// Create a new uninitialized MCP protocol session.
    ///
    /// `timeout` bounds the handshake and every later request.
    pub fn new(client: Arc<JsonRpcClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Perform the MCP `initialize` / `notifications/initialized` handshake.
    ///
    /// # Errors
    ///
    /// - [`TestkitError::ProtocolVersion`] if the server selects a revision
    ///   outside [`SUPPORTED_PROTOCOL_VERSIONS`].
    /// - [`TestkitError::Timeout`] if the server does not answer in time.
    /// - [`TestkitError::Protocol`] if the server rejects `initialize`.
    pub async fn initialize(
        self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<InitializedMcpProtocol> {
        let response: ServerInfo = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities,
                    client_info,
                },
                self.timeout,
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(TestkitError::ProtocolVersion {
                expected: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            }
            .into());
        }

        self.client
            .notify(METHOD_INITIALIZED, serde_json::json!({}))?;

        tracing::debug!(
            server = %response.server_info.name,
            version = %response.server_info.version,
            protocol = %response.protocol_version,
            "handshake complete"
        );

        Ok(InitializedMcpProtocol {
            client: self.client,
            timeout: self.timeout,
            server_info: response,
        })
    }
}

/// A fully negotiated MCP client session.
#[derive(Debug)]
pub struct InitializedMcpProtocol {
    client: Arc<JsonRpcClient>,
    timeout: Duration,
    server_info: ServerInfo,
}

impl InitializedMcpProtocol {
    /// The server's answer to `initialize`.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Whether the underlying client has stopped, e.g. because the server
    /// closed its end.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Check whether the server advertised `capability` during the handshake.
    pub fn capable(&self, capability: ServerCapabilityFlag) -> bool {
        let caps = &self.server_info.capabilities;
        match capability {
            ServerCapabilityFlag::Tools => caps.tools.is_some(),
            ServerCapabilityFlag::Resources => caps.resources.is_some(),
            ServerCapabilityFlag::Prompts => caps.prompts.is_some(),
            ServerCapabilityFlag::Logging => caps.logging.is_some(),
            ServerCapabilityFlag::Completions => caps.completions.is_some(),
        }
    }

    async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: DeserializeOwned,
    {
        self.client.request(method, params, self.timeout).await
    }

    /// Fetch every page of a paginated list method.
    async fn collect_pages<Page, Item>(
        &self,
        method: &str,
        split: impl Fn(Page) -> (Vec<Item>, Option<String>),
    ) -> Result<Vec<Item>>
    where
        Page: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page: Page = self.request(method, PaginatedParams { cursor }).await?;
            let (batch, next) = split(page);
            items.extend(batch);

            match next {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => return Ok(items),
            }
        }

        tracing::warn!(method, "stopped following cursors after {MAX_PAGES} pages");
        Ok(items)
    }

    /// List all tools advertised by the server.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.collect_pages(METHOD_TOOLS_LIST, |p: ListToolsResponse| {
            (p.tools, p.next_cursor)
        })
        .await
    }

    /// Invoke a named tool.
    ///
    /// # Errors
    ///
    /// A JSON-RPC error reply surfaces as [`TestkitError::Protocol`]. A tool
    /// that reports failure through `isError` still returns `Ok`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult> {
        self.request(
            METHOD_TOOLS_CALL,
            CallToolParams {
                name: name.to_string(),
                arguments,
            },
        )
        .await
    }

    /// List all resources advertised by the server.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        self.collect_pages(METHOD_RESOURCES_LIST, |p: ListResourcesResponse| {
            (p.resources, p.next_cursor)
        })
        .await
    }

    /// Read a resource by URI, returning every content entry.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResponse> {
        self.request(
            METHOD_RESOURCES_READ,
            ReadResourceParams {
                uri: uri.to_string(),
            },
        )
        .await
    }

    /// List all prompts advertised by the server.
    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>> {
        self.collect_pages(METHOD_PROMPTS_LIST, |p: ListPromptsResponse| {
            (p.prompts, p.next_cursor)
        })
        .await
    }

    /// Retrieve a rendered prompt. The result is returned as the server sent it.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<serde_json::Value> {
        self.request(
            METHOD_PROMPTS_GET,
            GetPromptParams {
                name: name.to_string(),
                arguments,
            },
        )
        .await
    }

    /// Send a `ping` request and wait for the reply.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.request(METHOD_PING, serde_json::json!({})).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
