//! MCP (Model Context Protocol) client for mcp-bridge.
//!
//! Talks to one stdio-based tool server using newline-delimited JSON-RPC 2.0
//! messages. The server is spawned as a child process, initialized with a
//! handshake, and then serves tool listing, tool calls and prompt rendering.

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
mod server;
mod transport;

pub use client::{McpClient, McpContent, McpToolResult};
pub use config::{ServerCommand, ServerSettings};
pub use error::McpError;
