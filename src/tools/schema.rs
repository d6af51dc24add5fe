//! 动作 Schema（schemars 自动生成）
//!
//! 声明给 Oracle 的参数 Schema 与服务端解码用的是同一个结构体，避免两边漂移。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 唯一受支持的动作名
pub const ADJUST_THRESHOLD: &str = "adjust_threshold";

/// adjust_threshold 的参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AdjustThresholdArgs {
    /// 新的 CPU 告警阈值（百分比，0~100）
    #[schemars(range(min = 0, max = 100))]
    pub value: f64,
}

/// 声明给 Oracle / MCP 客户端的动作描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: Value,
}

impl ActionSpec {
    pub fn adjust_threshold() -> Self {
        Self {
            name: ADJUST_THRESHOLD.to_string(),
            description: "Dynamically adjust the CPU alert threshold (0~100)".to_string(),
            parameters: adjust_threshold_schema(),
        }
    }
}

/// AdjustThresholdArgs 的 JSON Schema（去掉 $schema / title，只保留对象结构）
pub fn adjust_threshold_schema() -> Value {
    let schema = schema_for!(AdjustThresholdArgs);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "object",
            "properties": {"value": {"type": "number", "minimum": 0, "maximum": 100}},
            "required": ["value"]
        })
    });
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}
