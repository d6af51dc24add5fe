//! 工具调用通道抽象
//!
//! 决策循环只依赖 ToolTransport：生产环境是 McpSession（HTTP），测试里换成脚本化实现。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{ActionResult, DispatchError};

#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// 同步请求/响应；任何失败都以可恢复错误返回，不终止进程
    async fn call(&self, operation: &str, arguments: Value) -> Result<ActionResult, DispatchError>;
}
