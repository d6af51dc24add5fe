//! 确定性 Oracle（无需 API）
//!
//! - RuleDecider：直接套用决策规则（CPU 高于 85% 时建议把阈值调到 90），本地跑通闭环用
//! - ScriptedDecider：按顺序返回预设的回复，测试用

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::control::{SituationalContext, CPU_USAGE_PERCENT};
use crate::core::{ActionProposal, DecisionError};
use crate::llm::DecisionPort;
use crate::tools::{ActionSpec, ADJUST_THRESHOLD};

/// CPU 使用率高于此值时建议调高阈值
pub const RULE_CPU_TRIGGER: f64 = 85.0;
/// 建议的新阈值
pub const RULE_SUGGESTED_THRESHOLD: f64 = 90.0;

#[derive(Debug, Default)]
pub struct RuleDecider;

#[async_trait]
impl DecisionPort for RuleDecider {
    async fn decide(
        &self,
        context: &SituationalContext,
        available_actions: &[ActionSpec],
    ) -> Result<Vec<ActionProposal>, DecisionError> {
        if !available_actions.iter().any(|a| a.name == ADJUST_THRESHOLD) {
            return Ok(Vec::new());
        }
        match context.metric(CPU_USAGE_PERCENT) {
            Some(cpu) if cpu > RULE_CPU_TRIGGER => Ok(vec![ActionProposal::new(
                ADJUST_THRESHOLD,
                serde_json::json!({ "value": RULE_SUGGESTED_THRESHOLD }),
            )]),
            Some(_) => Ok(Vec::new()),
            None => Err(DecisionError::Malformed(format!(
                "context has no {CPU_USAGE_PERCENT}"
            ))),
        }
    }
}

/// 脚本化 Oracle：每次 decide 弹出一条预设回复，用完后返回空提案
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    replies: Mutex<VecDeque<Result<Vec<ActionProposal>, DecisionError>>>,
    calls: Mutex<Vec<SituationalContext>>,
}

impl ScriptedDecider {
    pub fn new(replies: impl IntoIterator<Item = Result<Vec<ActionProposal>, DecisionError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 收到过的情境（按调用顺序）
    pub fn seen_contexts(&self) -> Vec<SituationalContext> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DecisionPort for ScriptedDecider {
    async fn decide(
        &self,
        context: &SituationalContext,
        _available_actions: &[ActionSpec],
    ) -> Result<Vec<ActionProposal>, DecisionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(context.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
