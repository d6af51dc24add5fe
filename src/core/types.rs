//! 领域数据：Threshold（受管资源）、ActionProposal（Oracle 提案）、ActionResult（工具执行结果）

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ToolError;

/// 阈值下限（含）
pub const THRESHOLD_MIN: f64 = 0.0;
/// 阈值上限（含）
pub const THRESHOLD_MAX: f64 = 100.0;
/// 首次访问且无持久化状态时的默认阈值
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// CPU 告警阈值（百分比），构造即校验 0 ≤ value ≤ 100
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ToolError> {
        if !value.is_finite() {
            return Err(ToolError::InvalidArgument(format!("{value} is not a finite number")));
        }
        if !(THRESHOLD_MIN..=THRESHOLD_MAX).contains(&value) {
            return Err(ToolError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// Oracle 给出的一次动作提案；name 与 arguments 均不可信，由工具服务重新校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ActionProposal {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
}

/// 工具执行成功的结果，带 old_value 便于审计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub old_value: f64,
    pub new_value: f64,
    pub status: ActionStatus,
}

impl ActionResult {
    pub fn success(old: Threshold, new: Threshold) -> Self {
        Self {
            old_value: old.value(),
            new_value: new.value(),
            status: ActionStatus::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_bounds_inclusive() {
        assert_eq!(Threshold::new(0.0).unwrap().value(), 0.0);
        assert_eq!(Threshold::new(100.0).unwrap().value(), 100.0);
        assert!(matches!(Threshold::new(-0.1), Err(ToolError::OutOfRange(_))));
        assert!(matches!(Threshold::new(100.5), Err(ToolError::OutOfRange(_))));
        assert!(matches!(Threshold::new(f64::NAN), Err(ToolError::InvalidArgument(_))));
    }

    #[test]
    fn test_threshold_default() {
        assert_eq!(Threshold::default().value(), DEFAULT_THRESHOLD);
        assert_eq!(Threshold::default().to_string(), "80.0");
    }

    #[test]
    fn test_action_result_wire_shape() {
        let result = ActionResult::success(Threshold::default(), Threshold::new(90.0).unwrap());
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"old_value": 80.0, "new_value": 90.0, "status": "success"})
        );
    }
}
