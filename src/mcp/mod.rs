//! MCP 通道：JSON-RPC 2.0 over Streamable HTTP
//!
//! - **protocol**: 消息与载荷类型
//! - **server**: axum 服务端（ToolService 前端）
//! - **client**: 握手与会话（DecisionLoop 一侧）
//! - **transport**: 决策循环依赖的调用抽象

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{McpClient, McpSession};
pub use protocol::{Implementation, LATEST_PROTOCOL_VERSION, SESSION_HEADER};
pub use server::{router, serve, McpServer};
pub use transport::ToolTransport;
