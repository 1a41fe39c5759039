//! mcp-testkit - test harness for Model Context Protocol servers
//!
//! This library spawns an MCP server as a child process, performs the
//! protocol handshake over stdio, and exposes typed calls so tests can
//! assert on what the server returns.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Connection lifecycle and the typed call surface
//! - `mcp`: JSON-RPC client, MCP handshake, wire types and transports
//! - `assertions`: Structural checks over tools, resources, prompts and errors
//! - `mock`: In-memory server for testing client code without a process
//! - `config`: Session configuration and YAML loading
//! - `error`: Error types and result aliases
//! - `logging`: Tracing subscriber setup
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use mcp_testkit::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::new(SessionConfig::new("node").arg("build/index.js"));
//!     session.connect().await?;
//!
//!     let tools = session.list_tools().await?;
//!     mcp_testkit::assertions::assert_tool_exists(&tools, "echo")?;
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod mock;
pub mod session;

// Re-export commonly used types
pub use config::{SessionConfig, TransportKind};
pub use error::{Result, TestkitError};
pub use mock::MockServer;
pub use mcp::protocol::ServerCapabilityFlag;
pub use session::Session;
