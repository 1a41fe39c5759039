//! MCP test server binary for integration tests
//!
//! This binary implements a small MCP server that communicates over
//! stdin/stdout using newline-delimited JSON. Integration tests spawn it
//! through a `Session` so the whole stack runs against a real process.
//!
//! # Handled Methods
//!
//! - `initialize` -- echoes a supported `protocolVersion`, advertises tools,
//!   resources and prompts.
//! - `notifications/initialized` -- swallowed.
//! - `tools/list` -- `echo`, `calculate`, `slow`, `env`, `fail`; empty when
//!   started with `--empty`.
//! - `tools/call` -- see the tool handlers below. `calculate` rejects
//!   division by zero with `-32602`.
//! - `resources/list`, `resources/read` -- `test://static/greeting` and
//!   `test://multi` (two content entries). Unknown URIs get `-32002`.
//! - `prompts/list`, `prompts/get` -- one `greeting` prompt.
//! - `ping` -- empty result.
//! - All other methods -- `-32601 Method not found`.
//!
//! `slow` runs on its own thread so other requests keep being answered
//! while it sleeps.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

const SUPPORTED_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const RESOURCE_NOT_FOUND: i64 = -32002;

type Reply = Result<Value, (i64, String)>;

fn main() {
    let empty = std::env::args().any(|a| a == "--empty");
    let out = Arc::new(Mutex::new(io::stdout()));
    eprintln!("mcp_test_server starting (empty={empty})");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                write_reply(&out, &Value::Null, Err((PARSE_ERROR, "Parse error".to_string())));
                continue;
            }
        };

        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let Some(id) = request.get("id").cloned() else {
            // Notifications need no reply.
            continue;
        };
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        if method == "tools/call" && params["name"] == "slow" {
            let out = Arc::clone(&out);
            std::thread::spawn(move || {
                let reply = tool_slow(&params["arguments"]);
                write_reply(&out, &id, reply);
            });
            continue;
        }

        let reply = match method.as_str() {
            "initialize" => handle_initialize(&params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(handle_tools_list(empty)),
            "tools/call" => handle_tools_call(&params),
            "resources/list" => Ok(handle_resources_list()),
            "resources/read" => handle_resources_read(&params),
            "prompts/list" => Ok(handle_prompts_list()),
            "prompts/get" => handle_prompts_get(&params),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };
        write_reply(&out, &id, reply);
    }

    eprintln!("mcp_test_server stdin closed, exiting");
}

fn write_reply(out: &Mutex<io::Stdout>, id: &Value, reply: Reply) {
    let response = match reply {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    };
    if let Ok(mut out) = out.lock() {
        let _ = writeln!(out, "{}", response);
        let _ = out.flush();
    }
}

fn handle_initialize(params: &Value) -> Reply {
    let requested = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(SUPPORTED_VERSIONS[0]);
    let version = if SUPPORTED_VERSIONS.contains(&requested) {
        requested
    } else {
        SUPPORTED_VERSIONS[0]
    };
    Ok(json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": {},
            "prompts": {}
        },
        "serverInfo": { "name": "mcp_test_server", "version": "0.1.0" }
    }))
}

fn handle_tools_list(empty: bool) -> Value {
    if empty {
        return json!({ "tools": [] });
    }
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "Echoes the message argument back",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            },
            {
                "name": "calculate",
                "description": "Basic arithmetic on two numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "operation": {
                            "type": "string",
                            "enum": ["add", "subtract", "multiply", "divide"]
                        },
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["operation", "a", "b"]
                }
            },
            {
                "name": "slow",
                "description": "Sleeps before answering",
                "inputSchema": {
                    "type": "object",
                    "properties": { "ms": { "type": "integer" } }
                }
            },
            {
                "name": "env",
                "description": "Reports the value of an environment variable (lossy UTF-8)",
                "inputSchema": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }
            },
            {
                "name": "fail",
                "description": "Always reports a tool-level error",
                "inputSchema": { "type": "object" }
            }
        ]
    })
}

fn text(value: impl Into<String>) -> Value {
    json!({ "content": [{ "type": "text", "text": value.into() }] })
}

fn handle_tools_call(params: &Value) -> Reply {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));
    match name {
        "echo" => {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .ok_or((INVALID_PARAMS, "message is required".to_string()))?;
            Ok(text(message))
        }
        "calculate" => tool_calculate(&args),
        "env" => {
            let key = args
                .get("name")
                .and_then(Value::as_str)
                .ok_or((INVALID_PARAMS, "name is required".to_string()))?;
            let value = std::env::var_os(key)
                .map(|v| v.to_string_lossy().into_owned())
                .unwrap_or_else(|| "<unset>".to_string());
            Ok(text(value))
        }
        "fail" => Ok(json!({
            "content": [{ "type": "text", "text": "intentional failure" }],
            "isError": true
        })),
        other => Err((METHOD_NOT_FOUND, format!("Unknown tool: {}", other))),
    }
}

fn tool_calculate(args: &Value) -> Reply {
    let number = |key: &str| {
        args.get(key)
            .and_then(Value::as_f64)
            .ok_or((INVALID_PARAMS, format!("{} must be a number", key)))
    };
    let a = number("a")?;
    let b = number("b")?;
    let result = match args.get("operation").and_then(Value::as_str) {
        Some("add") => a + b,
        Some("subtract") => a - b,
        Some("multiply") => a * b,
        Some("divide") => {
            if b == 0.0 {
                return Err((INVALID_PARAMS, "Division by zero".to_string()));
            }
            a / b
        }
        other => return Err((INVALID_PARAMS, format!("Unknown operation: {:?}", other))),
    };
    Ok(text(result.to_string()))
}

fn tool_slow(args: &Value) -> Reply {
    let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(30_000);
    std::thread::sleep(Duration::from_millis(ms));
    Ok(text(format!("done after {}ms", ms)))
}

fn handle_resources_list() -> Value {
    json!({
        "resources": [
            {
                "uri": "test://static/greeting",
                "name": "greeting",
                "description": "A static greeting",
                "mimeType": "text/plain"
            },
            {
                "uri": "test://multi",
                "name": "multi",
                "description": "A resource with two content entries",
                "mimeType": "text/plain"
            }
        ]
    })
}

fn handle_resources_read(params: &Value) -> Reply {
    let uri = params.get("uri").and_then(Value::as_str).unwrap_or("");
    match uri {
        "test://static/greeting" => Ok(json!({
            "contents": [
                { "uri": uri, "mimeType": "text/plain", "text": "Hello from the test server" }
            ]
        })),
        "test://multi" => Ok(json!({
            "contents": [
                { "uri": uri, "mimeType": "text/plain", "text": "first part" },
                { "uri": uri, "mimeType": "text/plain", "text": "second part" }
            ]
        })),
        other => Err((RESOURCE_NOT_FOUND, format!("Resource not found: {}", other))),
    }
}

fn handle_prompts_list() -> Value {
    json!({
        "prompts": [
            {
                "name": "greeting",
                "description": "Greets someone by name",
                "arguments": [
                    { "name": "name", "description": "Who to greet", "required": true }
                ]
            }
        ]
    })
}

fn handle_prompts_get(params: &Value) -> Reply {
    match params.get("name").and_then(Value::as_str) {
        Some("greeting") => {
            let who = params
                .get("arguments")
                .and_then(|a| a.get("name"))
                .and_then(Value::as_str)
                .ok_or((INVALID_PARAMS, "missing required argument `name`".to_string()))?;
            Ok(json!({
                "description": "Greets someone by name",
                "messages": [{
                    "role": "user",
                    "content": { "type": "text", "text": format!("Please greet {}.", who) }
                }]
            }))
        }
        other => Err((METHOD_NOT_FOUND, format!("Unknown prompt: {:?}", other))),
    }
}
