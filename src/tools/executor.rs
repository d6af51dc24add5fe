//! 工具执行器
//!
//! 持有 ToolRegistry；每次调用输出结构化审计日志（JSON），
//! 参数校验失败属于预期拒绝，不按故障级别记录。
//! 这里不对调用加超时：取消一个已进入临界区的写入会让调用方看到与磁盘不一致的结果，
//! 等待上限由各工具自己在可安全放弃的位置（如等锁）设置。

use std::time::Instant;

use serde_json::Value;

use crate::core::{ActionResult, ToolError};
use crate::tools::schema::ActionSpec;
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// 执行指定工具并记录审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<ActionResult, ToolError> {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = self.registry.call(tool_name, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        match &result {
            Err(e) if !e.kind().is_validation() => {
                tracing::warn!(audit = %audit, error = %e, "tool")
            }
            _ => tracing::info!(audit = %audit, "tool"),
        }

        result
    }

    pub fn specs(&self) -> Vec<ActionSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({ "value": "x".repeat(500) });
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
        assert_eq!(args_preview(&serde_json::json!({"value": 1})), r#"{"value":1}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_through_executor() {
        let executor = ToolExecutor::new(ToolRegistry::new());
        let err = executor
            .execute("nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "unknown_tool");
        assert!(executor.tool_names().is_empty());
    }
}
