// mcp-bridge -- mcp
//! MCP (Model Context Protocol) client: JSON-RPC 2.0 over one WebSocket.
//!
//! Layers, bottom-up:
//! - [`transport`]: the duplex connection and its single reader task.
//! - [`correlator`]: waiter registry matching responses to requests by id.
//! - [`client`]: `initialize` / `call_tool` / `list_tools` / `ping` / `close`.
//! - [`payload`]: structured-or-raw decode of tool result text.
//!
//! Protocol: <https://spec.modelcontextprotocol.io/2024-11-05/>

pub mod client;
pub mod correlator;
pub mod error;
pub mod id;
pub mod payload;
pub mod protocol;
pub mod transport;

pub use client::{ClientInfo, ConnectionState, Handshake, McpClient};
pub use error::McpError;
pub use id::{ids_match, normalize_identifier, IdKey, RequestId};
pub use payload::ToolPayload;
pub use protocol::{Content, ToolCallResult, ToolDescriptor};
pub use transport::{memory_transport, MemoryPeer};
