//! 错误分类
//!
//! 工具服务侧：ToolError（参数校验 / 越界 / 持久化 / 未知工具），StoreError（文件读写）。
//! 决策循环侧：DecisionError（Oracle 不可达或回复无法解析）、DispatchError（工具调用失败）、
//! InitializationError（握手失败，进程级致命）。除 InitializationError 外均可恢复：记录日志后进入下一轮。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 机器可读的错误类别，随 tools/call 的 structuredContent 返回给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidArgument,
    OutOfRange,
    PersistenceError,
    UnknownTool,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::InvalidArgument => "invalid_argument",
            ToolErrorKind::OutOfRange => "out_of_range",
            ToolErrorKind::PersistenceError => "persistence_error",
            ToolErrorKind::UnknownTool => "unknown_tool",
        }
    }

    /// 参数类错误属于预期的输入拒绝路径，不算故障
    pub fn is_validation(&self) -> bool {
        matches!(self, ToolErrorKind::InvalidArgument | ToolErrorKind::OutOfRange)
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具服务返回给调用方的错误；任何一种都不会修改持久化状态
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("parameter 'value' must be a number: {0}")]
    InvalidArgument(String),

    #[error("'value' must be between 0 and 100, got {0}")]
    OutOfRange(f64),

    #[error("failed to persist threshold: {0}")]
    Persistence(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::InvalidArgument(_) => ToolErrorKind::InvalidArgument,
            ToolError::OutOfRange(_) => ToolErrorKind::OutOfRange,
            ToolError::Persistence(_) => ToolErrorKind::PersistenceError,
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
        }
    }
}

/// ConfigStore 写入失败
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 已建立会话上的单次请求失败（网络、HTTP 状态、JSON-RPC 错误、响应格式不对）
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

/// 把一个动作提案交给工具服务执行时可能的失败
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 工具服务明确拒绝（参数错误、越界、持久化失败等）；对端未给出类别时 kind 为 None
    #[error("tool rejected: {message}")]
    Rejected {
        kind: Option<ToolErrorKind>,
        message: String,
    },

    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),
}

impl DispatchError {
    /// 日志用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Transport(_) => "transport_error",
            DispatchError::Rejected { kind: Some(kind), .. } => kind.as_str(),
            DispatchError::Rejected { kind: None, .. } => "tool_error",
            DispatchError::Timeout(_) => "timeout",
        }
    }
}

/// 握手 / 会话建立失败：没有可用通道，持有进程应终止
#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("cannot reach tool service: {0}")]
    Unreachable(String),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
}

impl From<TransportError> for InitializationError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Http(msg) => InitializationError::Unreachable(msg),
            other => InitializationError::Handshake(other.to_string()),
        }
    }
}

/// Oracle 调用失败：本轮不产生任何提案
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("oracle unreachable: {0}")]
    Unreachable(String),

    #[error("malformed oracle reply: {0}")]
    Malformed(String),

    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_kinds() {
        assert_eq!(
            ToolError::InvalidArgument("x".into()).kind(),
            ToolErrorKind::InvalidArgument
        );
        assert_eq!(ToolError::OutOfRange(101.0).kind(), ToolErrorKind::OutOfRange);
        assert!(ToolErrorKind::OutOfRange.is_validation());
        assert!(!ToolErrorKind::PersistenceError.is_validation());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let v = serde_json::to_value(ToolErrorKind::PersistenceError).unwrap();
        assert_eq!(v, "persistence_error");
        let back: ToolErrorKind = serde_json::from_value(serde_json::json!("out_of_range")).unwrap();
        assert_eq!(back, ToolErrorKind::OutOfRange);
    }

    #[test]
    fn test_transport_http_maps_to_unreachable() {
        let err: InitializationError = TransportError::Http("connection refused".into()).into();
        assert!(matches!(err, InitializationError::Unreachable(_)));
        let err: InitializationError = TransportError::Rpc {
            code: -32600,
            message: "bad".into(),
        }
        .into();
        assert!(matches!(err, InitializationError::Handshake(_)));
    }

    #[test]
    fn test_dispatch_error_kind() {
        let err = DispatchError::Rejected {
            kind: Some(ToolErrorKind::OutOfRange),
            message: "too big".into(),
        };
        assert_eq!(err.kind(), "out_of_range");
        let err = DispatchError::Rejected {
            kind: None,
            message: "?".into(),
        };
        assert_eq!(err.kind(), "tool_error");
        assert_eq!(DispatchError::Timeout(Duration::from_secs(1)).kind(), "timeout");
    }
}
