//! In-memory MCP server for testing client code without a process
//!
//! [`MockServer`] keeps a registry of tools, resources and prompts. It can be
//! queried directly through methods that mirror [`crate::Session`], answer
//! raw requests through [`MockServer::handle`], or sit behind a transport
//! with [`MockServer::serve`] so a real `Session` talks to it.
//!
//! ```
//! use std::sync::Arc;
//! use mcp_testkit::mcp::transport::fake::FakeTransport;
//! use mcp_testkit::mcp::types::CallToolResult;
//! use mcp_testkit::mock::MockServer;
//! use mcp_testkit::{Session, SessionConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut mock = MockServer::new("mock", "1.0.0");
//! mock.add_tool("greet", "Say hello", |_args| Ok(CallToolResult::text("hello")));
//!
//! let (client_end, server_end) = FakeTransport::pair();
//! let _server = Arc::new(mock).serve(Arc::new(server_end));
//!
//! let session = Session::new(SessionConfig::new("in-process"));
//! session.connect_transport(Arc::new(client_end)).await?;
//! let result = session.call_tool("greet", serde_json::Value::Null).await?;
//! assert_eq!(result.text_content(), "hello");
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{Result, TestkitError};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    CallToolParams, CallToolResult, GetPromptParams, Implementation, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, PromptArgument, PromptDescriptor, ReadResourceParams,
    ResourceContents, ResourceDescriptor, ToolDescriptor, INVALID_PARAMS, INVALID_REQUEST,
    LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_NOT_FOUND, METHOD_PING,
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PARSE_ERROR, RESOURCE_NOT_FOUND,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Outcome of a mock handler: a result, or the JSON-RPC error a real server
/// would send.
pub type HandlerResult<T> = std::result::Result<T, JsonRpcError>;

/// Implementation of a mock tool.
pub type ToolHandler =
    Arc<dyn Fn(&serde_json::Map<String, Value>) -> HandlerResult<CallToolResult> + Send + Sync>;

/// Implementation of a mock prompt.
pub type PromptHandler = Arc<dyn Fn(&HashMap<String, String>) -> HandlerResult<Value> + Send + Sync>;

struct MockTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

struct MockResource {
    descriptor: ResourceDescriptor,
    contents: Vec<ResourceContents>,
}

struct MockPrompt {
    descriptor: PromptDescriptor,
    handler: PromptHandler,
}

/// Registry-backed stand-in for an MCP server.
///
/// Listings are returned in name (or URI) order.
pub struct MockServer {
    info: Implementation,
    tools: BTreeMap<String, MockTool>,
    resources: BTreeMap<String, MockResource>,
    prompts: BTreeMap<String, MockPrompt>,
}

impl fmt::Debug for MockServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServer")
            .field("info", &self.info)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn invalid_params(e: impl fmt::Display) -> JsonRpcError {
    JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e))
}

fn parse_params<T: DeserializeOwned>(params: Value) -> HandlerResult<T> {
    serde_json::from_value(params).map_err(invalid_params)
}

fn to_value<T: serde::Serialize>(value: &T) -> HandlerResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        JsonRpcError::new(
            crate::mcp::types::INTERNAL_ERROR,
            format!("failed to encode result: {}", e),
        )
    })
}

impl MockServer {
    /// Create an empty mock identifying itself as `name`/`version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
                title: None,
            },
            tools: BTreeMap::new(),
            resources: BTreeMap::new(),
            prompts: BTreeMap::new(),
        }
    }

    /// Register a tool with an open object schema.
    pub fn add_tool<F>(&mut self, name: &str, description: &str, handler: F) -> &mut Self
    where
        F: Fn(&serde_json::Map<String, Value>) -> HandlerResult<CallToolResult>
            + Send
            + Sync
            + 'static,
    {
        self.add_tool_with_schema(
            ToolDescriptor {
                name: name.to_string(),
                title: None,
                description: Some(description.to_string()),
                input_schema: json!({ "type": "object", "properties": {} }),
                output_schema: None,
                annotations: None,
            },
            handler,
        )
    }

    /// Register a tool with a full descriptor. Replaces any tool of the same
    /// name.
    pub fn add_tool_with_schema<F>(&mut self, descriptor: ToolDescriptor, handler: F) -> &mut Self
    where
        F: Fn(&serde_json::Map<String, Value>) -> HandlerResult<CallToolResult>
            + Send
            + Sync
            + 'static,
    {
        self.tools.insert(
            descriptor.name.clone(),
            MockTool {
                descriptor,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Register a resource with one text content entry.
    pub fn add_text_resource(
        &mut self,
        uri: &str,
        name: &str,
        mime_type: &str,
        text: &str,
    ) -> &mut Self {
        self.add_resource(
            ResourceDescriptor {
                uri: uri.to_string(),
                name: name.to_string(),
                description: None,
                mime_type: Some(mime_type.to_string()),
            },
            vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(mime_type.to_string()),
                text: Some(text.to_string()),
                blob: None,
            }],
        )
    }

    /// Register a resource with arbitrary content entries.
    pub fn add_resource(
        &mut self,
        descriptor: ResourceDescriptor,
        contents: Vec<ResourceContents>,
    ) -> &mut Self {
        self.resources.insert(
            descriptor.uri.clone(),
            MockResource {
                descriptor,
                contents,
            },
        );
        self
    }

    /// Register a prompt.
    pub fn add_prompt<F>(
        &mut self,
        name: &str,
        description: &str,
        arguments: Vec<PromptArgument>,
        handler: F,
    ) -> &mut Self
    where
        F: Fn(&HashMap<String, String>) -> HandlerResult<Value> + Send + Sync + 'static,
    {
        self.prompts.insert(
            name.to_string(),
            MockPrompt {
                descriptor: PromptDescriptor {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    arguments,
                },
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Registered tools.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor.clone()).collect()
    }

    /// Run a registered tool.
    ///
    /// # Errors
    ///
    /// [`TestkitError::Protocol`] with `-32601` for an unknown tool, or the
    /// handler's own error.
    pub fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(TestkitError::Protocol(invalid_params(format!(
                    "arguments must be an object, got {}",
                    other
                )))
                .into())
            }
        };
        self.run_tool(name, &arguments)
            .map_err(|e| TestkitError::Protocol(e).into())
    }

    /// Registered resources.
    pub fn list_resources(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .values()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    /// First content entry of a registered resource.
    ///
    /// # Errors
    ///
    /// [`TestkitError::Protocol`] with `-32002` if the URI is unknown or has
    /// no contents.
    pub fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        self.resource_contents(uri)
            .and_then(|contents| {
                contents
                    .first()
                    .cloned()
                    .ok_or_else(|| resource_not_found(uri))
            })
            .map_err(|e| TestkitError::Protocol(e).into())
    }

    /// Registered prompts.
    pub fn list_prompts(&self) -> Vec<PromptDescriptor> {
        self.prompts.values().map(|p| p.descriptor.clone()).collect()
    }

    /// Render a registered prompt.
    ///
    /// # Errors
    ///
    /// [`TestkitError::Protocol`] with `-32601` for an unknown prompt, or the
    /// handler's own error.
    pub fn get_prompt(&self, name: &str, arguments: HashMap<String, String>) -> Result<Value> {
        self.render_prompt(name, &arguments)
            .map_err(|e| TestkitError::Protocol(e).into())
    }

    fn run_tool(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, Value>,
    ) -> HandlerResult<CallToolResult> {
        let tool = self.tools.get(name).ok_or_else(|| {
            JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown tool: {}", name))
        })?;
        (tool.handler)(arguments)
    }

    fn resource_contents(&self, uri: &str) -> HandlerResult<&[ResourceContents]> {
        self.resources
            .get(uri)
            .map(|r| r.contents.as_slice())
            .ok_or_else(|| resource_not_found(uri))
    }

    fn render_prompt(&self, name: &str, arguments: &HashMap<String, String>) -> HandlerResult<Value> {
        let prompt = self.prompts.get(name).ok_or_else(|| {
            JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown prompt: {}", name))
        })?;
        for arg in &prompt.descriptor.arguments {
            if arg.required == Some(true) && !arguments.contains_key(&arg.name) {
                return Err(invalid_params(format!(
                    "missing required argument `{}`",
                    arg.name
                )));
            }
        }
        (prompt.handler)(arguments)
    }

    fn capabilities(&self) -> Value {
        let mut caps = serde_json::Map::new();
        if !self.tools.is_empty() {
            caps.insert("tools".to_string(), json!({}));
        }
        if !self.resources.is_empty() {
            caps.insert("resources".to_string(), json!({}));
        }
        if !self.prompts.is_empty() {
            caps.insert("prompts".to_string(), json!({}));
        }
        Value::Object(caps)
    }

    /// Answer one JSON-RPC request.
    ///
    /// Lists are returned in a single page. Unknown methods get `-32601`.
    pub fn handle(&self, method: &str, params: Value) -> HandlerResult<Value> {
        match method {
            METHOD_INITIALIZE => {
                let requested = params
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(LATEST_PROTOCOL_VERSION);
                let version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
                    requested
                } else {
                    LATEST_PROTOCOL_VERSION
                };
                Ok(json!({
                    "protocolVersion": version,
                    "capabilities": self.capabilities(),
                    "serverInfo": self.info,
                }))
            }
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => Ok(json!({ "tools": self.list_tools() })),
            METHOD_TOOLS_CALL => {
                let call: CallToolParams = parse_params(params)?;
                let result = self.run_tool(&call.name, &call.arguments)?;
                to_value(&result)
            }
            METHOD_RESOURCES_LIST => Ok(json!({ "resources": self.list_resources() })),
            METHOD_RESOURCES_READ => {
                let read: ReadResourceParams = parse_params(params)?;
                let contents = self.resource_contents(&read.uri)?;
                Ok(json!({ "contents": contents }))
            }
            METHOD_PROMPTS_LIST => Ok(json!({ "prompts": self.list_prompts() })),
            METHOD_PROMPTS_GET => {
                let get: GetPromptParams = parse_params(params)?;
                self.render_prompt(&get.name, &get.arguments)
            }
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Answer requests arriving on `transport` until it closes.
    ///
    /// Notifications are ignored. Unparseable input gets a `-32700` reply
    /// with a null id.
    pub fn serve(self: Arc<Self>, transport: Arc<dyn Transport>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut inbound = transport.receive();
            while let Some(raw) = inbound.next().await {
                let response = match serde_json::from_str::<JsonRpcRequest>(&raw) {
                    Ok(request) => {
                        let Some(id) = request.id else {
                            tracing::trace!(method = %request.method, "mock ignored notification");
                            continue;
                        };
                        if request.jsonrpc != "2.0" {
                            JsonRpcResponse::failure(
                                id,
                                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
                            )
                        } else {
                            let params = request.params.unwrap_or(Value::Null);
                            match self.handle(&request.method, params) {
                                Ok(result) => JsonRpcResponse::success(id, result),
                                Err(error) => JsonRpcResponse::failure(id, error),
                            }
                        }
                    }
                    Err(e) => JsonRpcResponse::failure(
                        Value::Null,
                        JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                    ),
                };

                let encoded = match serde_json::to_string(&response) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::warn!("mock failed to encode response: {e}");
                        continue;
                    }
                };
                if transport.send(encoded).await.is_err() {
                    break;
                }
            }
            tracing::debug!("mock server stopped");
        })
    }
}

fn resource_not_found(uri: &str) -> JsonRpcError {
    JsonRpcError {
        code: RESOURCE_NOT_FOUND,
        message: format!("Resource not found: {}", uri),
        data: Some(json!({ "uri": uri })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::protocol_error;
    use crate::mcp::transport::fake::FakeTransport;
    use crate::{Session, SessionConfig};

    fn sample() -> MockServer {
        let mut mock = MockServer::new("mock", "0.1.0");
        mock.add_tool("echo", "Echo the message", |args| {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "message is required"))?;
            Ok(CallToolResult::text(message))
        })
        .add_text_resource("mock://readme", "readme", "text/plain", "read me")
        .add_resource(
            ResourceDescriptor {
                uri: "mock://multi".to_string(),
                name: "multi".to_string(),
                description: None,
                mime_type: None,
            },
            vec![
                ResourceContents {
                    uri: "mock://multi".to_string(),
                    text: Some("one".to_string()),
                    ..Default::default()
                },
                ResourceContents {
                    uri: "mock://multi".to_string(),
                    text: Some("two".to_string()),
                    ..Default::default()
                },
            ],
        )
        .add_prompt(
            "greeting",
            "Greet someone",
            vec![PromptArgument {
                name: "name".to_string(),
                description: None,
                required: Some(true),
            }],
            |args| {
                Ok(json!({
                    "messages": [{
                        "role": "user",
                        "content": {"type": "text", "text": format!("Hello, {}!", args["name"])}
                    }]
                }))
            },
        );
        mock
    }

    #[test]
    fn test_direct_calls_mirror_session_surface() {
        let mock = sample();
        assert_eq!(mock.list_tools()[0].name, "echo");
        assert_eq!(
            mock.call_tool("echo", json!({"message": "hi"}))
                .unwrap()
                .text_content(),
            "hi"
        );
        assert_eq!(mock.list_resources().len(), 2);
        assert_eq!(
            mock.read_resource("mock://multi").unwrap().text.as_deref(),
            Some("one")
        );
        assert_eq!(mock.list_prompts()[0].name, "greeting");
    }

    #[test]
    fn test_unknown_tool_is_method_not_found() {
        let err = sample().call_tool("nope", json!({})).unwrap_err();
        assert_eq!(protocol_error(&err).map(|e| e.code), Some(METHOD_NOT_FOUND));
    }

    #[test]
    fn test_unknown_prompt_is_method_not_found() {
        let err = sample().get_prompt("nope", HashMap::new()).unwrap_err();
        assert_eq!(protocol_error(&err).map(|e| e.code), Some(METHOD_NOT_FOUND));
    }

    #[test]
    fn test_missing_resource_is_resource_not_found() {
        let err = sample().read_resource("mock://missing").unwrap_err();
        let rpc = protocol_error(&err).unwrap();
        assert_eq!(rpc.code, RESOURCE_NOT_FOUND);
        assert_eq!(rpc.data, Some(json!({"uri": "mock://missing"})));
    }

    #[test]
    fn test_prompt_requires_declared_arguments() {
        let err = sample().get_prompt("greeting", HashMap::new()).unwrap_err();
        assert_eq!(protocol_error(&err).map(|e| e.code), Some(INVALID_PARAMS));
    }

    #[test]
    fn test_handler_error_is_passed_through() {
        let err = sample().call_tool("echo", json!({})).unwrap_err();
        let rpc = protocol_error(&err).unwrap();
        assert_eq!(rpc.code, INVALID_PARAMS);
        assert_eq!(rpc.message, "message is required");
    }

    #[test]
    fn test_handle_initialize_reports_registered_capabilities() {
        let mut mock = MockServer::new("tools-only", "1.0.0");
        mock.add_tool("t", "t", |_| Ok(CallToolResult::text("")));
        let result = mock
            .handle(METHOD_INITIALIZE, json!({"protocolVersion": "2025-03-26"}))
            .unwrap();
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "tools-only");
        assert!(result["capabilities"].get("tools").is_some());
        assert!(result["capabilities"].get("prompts").is_none());
    }

    #[test]
    fn test_handle_unknown_method() {
        let err = sample().handle("sampling/createMessage", Value::Null).unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    #[test]
    fn test_handle_bad_params_is_invalid_params() {
        let err = sample().handle(METHOD_TOOLS_CALL, json!({"arguments": {}})).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_session_over_served_mock() {
        let (client_end, server_end) = FakeTransport::pair();
        let server = Arc::new(sample()).serve(Arc::new(server_end));

        let session = Session::new(SessionConfig::new("in-process"));
        session.connect_transport(Arc::new(client_end)).await.unwrap();

        let info = session.get_server_info().await.unwrap();
        assert_eq!(info.server_info.name, "mock");

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);

        let first = session.read_resource("mock://multi").await.unwrap();
        assert_eq!(first.text.as_deref(), Some("one"));

        let mut args = HashMap::new();
        args.insert("name".to_string(), "Ada".to_string());
        let prompt = session.get_prompt("greeting", args).await.unwrap();
        assert_eq!(prompt["messages"][0]["content"]["text"], "Hello, Ada!");

        let err = session.read_resource("mock://missing").await.unwrap_err();
        assert_eq!(protocol_error(&err).map(|e| e.code), Some(RESOURCE_NOT_FOUND));

        session.disconnect().await;
        tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .expect("mock should stop once the session hangs up")
            .unwrap();
    }

    #[tokio::test]
    async fn test_serve_answers_garbage_with_parse_error() {
        let (client_end, server_end) = FakeTransport::pair();
        let _server = Arc::new(sample()).serve(Arc::new(server_end));

        client_end.send("not json".to_string()).await.unwrap();
        let reply = client_end.receive().next().await.unwrap();
        let reply: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["code"], PARSE_ERROR);
        assert!(reply["id"].is_null());
    }
}
