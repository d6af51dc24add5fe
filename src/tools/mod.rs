//! 工具服务：Schema、RPC 边界解码、注册表、执行器，以及唯一的 adjust_threshold 工具

pub mod command;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod threshold;

pub use command::ToolCommand;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use schema::{adjust_threshold_schema, ActionSpec, AdjustThresholdArgs, ADJUST_THRESHOLD};
pub use threshold::{AdjustThresholdTool, ThresholdService};
