//! 指标来源
//!
//! 真实采集不在本项目范围内；StubMetrics 模拟 80~95% 的 CPU 使用率。

use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::Rng;

use crate::control::CPU_USAGE_PERCENT;

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> Result<BTreeMap<String, f64>, String>;
}

#[derive(Debug, Default)]
pub struct StubMetrics;

#[async_trait]
impl MetricsSource for StubMetrics {
    async fn sample(&self) -> Result<BTreeMap<String, f64>, String> {
        let cpu = 80.0 + rand::thread_rng().gen::<f64>() * 15.0;
        Ok(BTreeMap::from([(CPU_USAGE_PERCENT.to_string(), cpu)]))
    }
}

/// 固定读数
#[derive(Debug, Clone)]
pub struct FixedMetrics(pub BTreeMap<String, f64>);

impl FixedMetrics {
    pub fn cpu(percent: f64) -> Self {
        Self(BTreeMap::from([(CPU_USAGE_PERCENT.to_string(), percent)]))
    }
}

#[async_trait]
impl MetricsSource for FixedMetrics {
    async fn sample(&self) -> Result<BTreeMap<String, f64>, String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_range() {
        for _ in 0..100 {
            let m = StubMetrics.sample().await.unwrap();
            let cpu = m[CPU_USAGE_PERCENT];
            assert!((80.0..95.0).contains(&cpu), "{cpu}");
        }
    }

    #[tokio::test]
    async fn test_fixed() {
        let m = FixedMetrics::cpu(90.0).sample().await.unwrap();
        assert_eq!(m[CPU_USAGE_PERCENT], 90.0);
    }
}
