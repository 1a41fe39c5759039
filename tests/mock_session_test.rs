//! A `Session` attached to an in-process `MockServer`

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use mcp_testkit::assertions::{assert_protocol_error, assert_tool_exists};
use mcp_testkit::mcp::transport::fake::FakeTransport;
use mcp_testkit::mcp::types::{CallToolResult, JsonRpcError, INVALID_PARAMS};
use mcp_testkit::{MockServer, Session, SessionConfig};

fn calculator() -> MockServer {
    let mut mock = MockServer::new("calculator", "2.0.0");
    mock.add_tool("divide", "Divide a by b", |args| {
        let a = args.get("a").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let b = args.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if b == 0.0 {
            return Err(JsonRpcError::new(INVALID_PARAMS, "Division by zero"));
        }
        Ok(CallToolResult::text((a / b).to_string()))
    });
    mock
}

async fn attach(mock: MockServer) -> Session {
    let (client_end, server_end) = FakeTransport::pair();
    let _server = Arc::new(mock).serve(Arc::new(server_end));

    let session = Session::new(SessionConfig::new("in-process").timeout_ms(2_000));
    session
        .connect_transport(Arc::new(client_end))
        .await
        .expect("handshake with mock failed");
    session
}

#[tokio::test]
async fn test_session_sees_mock_registry() {
    let session = attach(calculator()).await;

    let info = tokio_test::assert_ok!(session.get_server_info().await);
    assert_eq!(info.server_info.name, "calculator");
    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_none());

    let tools = tokio_test::assert_ok!(session.list_tools().await);
    tokio_test::assert_ok!(assert_tool_exists(&tools, "divide"));
    tokio_test::assert_err!(assert_tool_exists(&tools, "multiply"));

    let result = session
        .call_tool("divide", json!({ "a": 9, "b": 3 }))
        .await
        .unwrap();
    assert_eq!(result.text_content(), "3");

    session.disconnect().await;
}

#[tokio::test]
async fn test_mock_errors_reach_session_verbatim() {
    let session = attach(calculator()).await;

    let outcome = session.call_tool("divide", json!({ "a": 1, "b": 0 })).await;
    assert_protocol_error(&outcome, INVALID_PARAMS, Some("division by zero")).unwrap();

    let outcome = session.get_prompt("absent", HashMap::new()).await;
    assert_protocol_error(&outcome, -32601, None).unwrap();

    session.disconnect().await;
}

#[tokio::test]
async fn test_direct_and_served_answers_agree() {
    let mock = calculator();
    let direct = mock.call_tool("divide", json!({ "a": 5, "b": 2 })).unwrap();

    let session = attach(mock).await;
    let served = session
        .call_tool("divide", json!({ "a": 5, "b": 2 }))
        .await
        .unwrap();
    assert_eq!(direct, served);
    session.disconnect().await;
}
