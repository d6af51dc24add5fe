//! 工具注册表
//!
//! 工具实现 Tool trait（name / description / input_schema / call），由 ToolRegistry 按名注册与查找；
//! MCP 服务端的 tools/list 与 tools/call 都经由这里。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{ActionResult, ToolError};
use crate::tools::schema::ActionSpec;

/// 工具 trait：名称、描述（供 Oracle 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（tools/call 中的 name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn input_schema(&self) -> Value;

    /// 执行工具；参数校验在工具内部完成
    async fn call(&self, args: Value) -> Result<ActionResult, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 名称未注册时返回 UnknownTool，不会触达任何工具
    pub async fn call(&self, name: &str, args: Value) -> Result<ActionResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.call(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 已注册工具的声明（tools/list 用）
    pub fn specs(&self) -> Vec<ActionSpec> {
        self.tools
            .values()
            .map(|tool| ActionSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.input_schema(),
            })
            .collect()
    }
}
