//! Model Context Protocol client plumbing
//!
//! The implementation targets protocol revision **2025-11-25** and accepts
//! servers that negotiate any revision in
//! [`types::SUPPORTED_PROTOCOL_VERSIONS`].
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC primitives and the MCP subset the harness speaks
//! - `client`    -- Transport-agnostic async JSON-RPC 2.0 client
//! - `protocol`  -- Typed MCP lifecycle wrapper over `JsonRpcClient`
//! - `transport` -- `Transport` trait with stdio and in-process implementations

pub mod client;
pub mod protocol;
pub mod transport;
pub mod types;
