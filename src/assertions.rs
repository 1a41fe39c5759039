//! Structural checks over data returned by a session
//!
//! Every check is a plain function returning `Result<()>` so it composes
//! with `?` in tests; a failed check is [`TestkitError::Assertion`] with a
//! message naming what was expected and what was found.

use crate::error::{protocol_error, Result, TestkitError};
use crate::mcp::types::{
    CallToolResult, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
};

fn fail(message: String) -> anyhow::Error {
    TestkitError::Assertion(message).into()
}

fn names<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

/// A tool named `name` is present in `tools`.
pub fn assert_tool_exists(tools: &[ToolDescriptor], name: &str) -> Result<()> {
    if tools.iter().any(|t| t.name == name) {
        return Ok(());
    }
    Err(fail(format!(
        "Expected tool '{}' to exist, available: [{}]",
        name,
        names(tools.iter().map(|t| t.name.as_str()))
    )))
}

/// `tool` has a non-empty name and an object input schema whose `required`
/// entries all name declared properties.
///
/// # Examples
///
/// ```
/// use mcp_testkit::assertions::assert_valid_tool_schema;
/// use mcp_testkit::mcp::types::ToolDescriptor;
///
/// let tool: ToolDescriptor = serde_json::from_value(serde_json::json!({
///     "name": "add",
///     "inputSchema": {
///         "type": "object",
///         "properties": { "a": { "type": "number" } },
///         "required": ["a"]
///     }
/// }))
/// .unwrap();
/// assert!(assert_valid_tool_schema(&tool).is_ok());
/// ```
pub fn assert_valid_tool_schema(tool: &ToolDescriptor) -> Result<()> {
    if tool.name.trim().is_empty() {
        return Err(fail("Tool name must not be empty".to_string()));
    }

    let schema = tool
        .input_schema
        .as_object()
        .ok_or_else(|| fail(format!("Tool '{}' inputSchema is not an object", tool.name)))?;

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        other => {
            return Err(fail(format!(
                "Tool '{}' inputSchema type must be \"object\", got {:?}",
                tool.name, other
            )))
        }
    }

    let properties = match schema.get("properties") {
        None => None,
        Some(serde_json::Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(fail(format!(
                "Tool '{}' inputSchema properties must be an object",
                tool.name
            )))
        }
    };

    if let Some(required) = schema.get("required") {
        let required = required.as_array().ok_or_else(|| {
            fail(format!(
                "Tool '{}' inputSchema required must be an array",
                tool.name
            ))
        })?;
        for entry in required {
            let key = entry.as_str().ok_or_else(|| {
                fail(format!(
                    "Tool '{}' inputSchema required entries must be strings",
                    tool.name
                ))
            })?;
            if !properties.is_some_and(|p| p.contains_key(key)) {
                return Err(fail(format!(
                    "Tool '{}' requires '{}' which is not a declared property",
                    tool.name, key
                )));
            }
        }
    }

    Ok(())
}

/// `result` is not flagged `isError` and carries at least one content item.
pub fn assert_tool_success(result: &CallToolResult) -> Result<()> {
    if result.is_error == Some(true) {
        return Err(fail(format!(
            "Expected successful tool result, but got error: '{}'",
            result.text_content()
        )));
    }
    if result.content.is_empty() {
        return Err(fail("Tool result has no content".to_string()));
    }
    Ok(())
}

/// `result` is flagged `isError` and its text contains `expected_message`.
pub fn assert_tool_error(result: &CallToolResult, expected_message: &str) -> Result<()> {
    if result.is_error != Some(true) {
        return Err(fail(
            "Expected error tool result, but got success".to_string(),
        ));
    }
    let text = result.text_content();
    if !text.contains(expected_message) {
        return Err(fail(format!(
            "Expected error message to contain '{}', but got '{}'",
            expected_message, text
        )));
    }
    Ok(())
}

/// The concatenated text content of `result` contains `expected`.
pub fn assert_text_content(result: &CallToolResult, expected: &str) -> Result<()> {
    let text = result.text_content();
    if text.contains(expected) {
        Ok(())
    } else {
        Err(fail(format!(
            "Expected tool result to contain '{}', but got '{}'",
            expected, text
        )))
    }
}

/// A resource with `uri` is present in `resources`.
pub fn assert_resource_exists(resources: &[ResourceDescriptor], uri: &str) -> Result<()> {
    if resources.iter().any(|r| r.uri == uri) {
        return Ok(());
    }
    Err(fail(format!(
        "Expected resource '{}' to exist, available: [{}]",
        uri,
        names(resources.iter().map(|r| r.uri.as_str()))
    )))
}

/// `resource` has a non-empty URI and name, and a `type/subtype` MIME type
/// when one is given.
pub fn assert_valid_resource(resource: &ResourceDescriptor) -> Result<()> {
    if resource.uri.trim().is_empty() {
        return Err(fail("Resource uri must not be empty".to_string()));
    }
    if resource.name.trim().is_empty() {
        return Err(fail(format!(
            "Resource '{}' name must not be empty",
            resource.uri
        )));
    }
    if let Some(mime) = &resource.mime_type {
        let valid = mime
            .split_once('/')
            .is_some_and(|(kind, sub)| !kind.is_empty() && !sub.is_empty());
        if !valid {
            return Err(fail(format!(
                "Resource '{}' has malformed mimeType '{}'",
                resource.uri, mime
            )));
        }
    }
    Ok(())
}

/// A prompt named `name` is present in `prompts`.
pub fn assert_prompt_exists(prompts: &[PromptDescriptor], name: &str) -> Result<()> {
    if prompts.iter().any(|p| p.name == name) {
        return Ok(());
    }
    Err(fail(format!(
        "Expected prompt '{}' to exist, available: [{}]",
        name,
        names(prompts.iter().map(|p| p.name.as_str()))
    )))
}

/// `outcome` failed with a server error carrying `code`, and when
/// `message_contains` is given, a message containing it (case-insensitive).
///
/// # Examples
///
/// ```
/// use mcp_testkit::assertions::assert_protocol_error;
/// use mcp_testkit::error::TestkitError;
/// use mcp_testkit::mcp::types::JsonRpcError;
///
/// let outcome: anyhow::Result<()> =
///     Err(TestkitError::Protocol(JsonRpcError::new(-32602, "Division by zero")).into());
/// assert!(assert_protocol_error(&outcome, -32602, Some("division by zero")).is_ok());
/// ```
pub fn assert_protocol_error<T: std::fmt::Debug>(
    outcome: &Result<T>,
    code: i64,
    message_contains: Option<&str>,
) -> Result<()> {
    let err = match outcome {
        Ok(value) => {
            return Err(fail(format!(
                "Expected protocol error {}, but call succeeded with {:?}",
                code, value
            )))
        }
        Err(err) => err,
    };

    let rpc = protocol_error(err).ok_or_else(|| {
        fail(format!(
            "Expected protocol error {}, but got non-protocol failure: {}",
            code, err
        ))
    })?;

    if rpc.code != code {
        return Err(fail(format!(
            "Expected protocol error code {}, got {} ('{}')",
            code, rpc.code, rpc.message
        )));
    }

    if let Some(needle) = message_contains {
        if !rpc
            .message
            .to_lowercase()
            .contains(&needle.to_lowercase())
        {
            return Err(fail(format!(
                "Expected protocol error message to contain '{}', got '{}'",
                needle, rpc.message
            )));
        }
    }

    Ok(())
}
