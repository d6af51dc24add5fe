//! 核心层：领域类型、错误分类、循环阶段、优雅关闭

pub mod error;
pub mod shutdown;
pub mod state;
pub mod types;

pub use error::{
    DecisionError, DispatchError, InitializationError, StoreError, ToolError, ToolErrorKind,
    TransportError,
};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::LoopPhase;
pub use types::{
    ActionProposal, ActionResult, ActionStatus, Threshold, DEFAULT_THRESHOLD, THRESHOLD_MAX,
    THRESHOLD_MIN,
};
