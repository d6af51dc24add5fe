//! 控制层：指标采样、情境快照与决策主循环

pub mod context;
pub mod loop_;
pub mod metrics;

pub use context::{SituationalContext, CPU_USAGE_PERCENT, DECISION_RULE};
pub use loop_::{DecisionLoop, DispatchOutcome, LoopSettings, TickOutcome};
pub use metrics::{FixedMetrics, MetricsSource, StubMetrics};
