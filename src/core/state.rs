//! 决策循环阶段：Idle → Sampling → Deciding → Dispatching → Idle
//!
//! 没有终止态；Deciding 失败可直接回到 Idle（跳过 Dispatching），Sampling 失败同理。

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    #[default]
    Idle,
    Sampling,
    Deciding,
    Dispatching,
}

impl LoopPhase {
    /// 是否允许从当前阶段迁移到 next
    pub fn can_transition_to(self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        matches!(
            (self, next),
            (Idle, Sampling)
                | (Sampling, Deciding)
                | (Sampling, Idle)
                | (Deciding, Dispatching)
                | (Deciding, Idle)
                | (Dispatching, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Sampling => "sampling",
            LoopPhase::Deciding => "deciding",
            LoopPhase::Dispatching => "dispatching",
        }
    }
}
