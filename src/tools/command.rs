//! RPC 边界解码：把 (name, 无类型 JSON 参数) 变成强类型 ToolCommand
//!
//! 名称未知、参数缺失或类型不对、数值越界，都在进入业务逻辑之前被拒绝。

use serde_json::Value;

use crate::core::{Threshold, ToolError};
use crate::tools::schema::{AdjustThresholdArgs, ADJUST_THRESHOLD};

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCommand {
    AdjustThreshold { value: Threshold },
}

impl ToolCommand {
    pub fn decode(name: &str, arguments: &Value) -> Result<Self, ToolError> {
        match name {
            ADJUST_THRESHOLD => {
                // 参数必须是按名称的映射；serde 派生的结构体也接受位置数组，这里先挡掉
                if !arguments.is_object() {
                    return Err(ToolError::InvalidArgument(
                        "arguments must be an object with a 'value' field".to_string(),
                    ));
                }
                let args: AdjustThresholdArgs = serde_json::from_value(arguments.clone())
                    .map_err(|e| ToolError::InvalidArgument(e.to_string()))?;
                Ok(ToolCommand::AdjustThreshold {
                    value: Threshold::new(args.value)?,
                })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCommand::AdjustThreshold { .. } => ADJUST_THRESHOLD,
        }
    }
}
