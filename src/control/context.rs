//! 情境快照：每轮新建、用完即弃
//!
//! 包含采样时间、若干命名指标与静态决策规则，render_prompt 生成给 Oracle 的提示词。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::tools::ADJUST_THRESHOLD;

pub const CPU_USAGE_PERCENT: &str = "cpu_usage_percent";

/// 静态决策规则
pub const DECISION_RULE: &str = "If CPU usage stays above 85%, raise the alert threshold \
(for example to 90) to avoid alert storms.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SituationalContext {
    metrics: BTreeMap<String, f64>,
    rule: &'static str,
    sampled_at: DateTime<Utc>,
}

impl SituationalContext {
    pub fn new(metrics: BTreeMap<String, f64>) -> Self {
        Self {
            metrics,
            rule: DECISION_RULE,
            sampled_at: Utc::now(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    pub fn rule(&self) -> &str {
        self.rule
    }

    pub fn sampled_at(&self) -> DateTime<Utc> {
        self.sampled_at
    }

    pub fn render_prompt(&self) -> String {
        let mut prompt = String::from("Current system status:\n");
        for (name, value) in &self.metrics {
            prompt.push_str(&format!("- {}: {:.1}\n", name, value));
        }
        prompt.push_str(&format!("\nRule: {}\n", self.rule));
        prompt.push_str(&format!(
            "Decide whether the configuration needs adjusting. If it does, call the \
{ADJUST_THRESHOLD} tool with the new threshold (a number between 0 and 100).\n"
        ));
        prompt
    }
}
