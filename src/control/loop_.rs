//! 决策主循环
//!
//! Idle → Sampling → Deciding → Dispatching → Idle，严格串行：上一轮分发结束前不会开始下一轮采样。
//! 两个挂起点（Oracle 调用、工具调用）都有超时；超时与其它可恢复错误一样只记录日志，不在本轮重试。
//! 超时的一轮只会推迟下一轮，不补跑。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AgentSection;
use crate::control::{MetricsSource, SituationalContext, CPU_USAGE_PERCENT};
use crate::core::{ActionProposal, ActionResult, DecisionError, DispatchError, LoopPhase};
use crate::llm::DecisionPort;
use crate::mcp::ToolTransport;
use crate::tools::ActionSpec;

/// 周期与两个挂起点的超时
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub interval: Duration,
    pub decide_timeout: Duration,
    pub call_timeout: Duration,
}

impl From<&AgentSection> for LoopSettings {
    fn from(agent: &AgentSection) -> Self {
        Self {
            interval: Duration::from_secs(agent.interval_secs.max(1)),
            decide_timeout: Duration::from_secs(agent.decide_timeout_secs.max(1)),
            call_timeout: Duration::from_secs(agent.call_timeout_secs.max(1)),
        }
    }
}

/// 单个提案的处理结果
#[derive(Debug)]
pub enum DispatchOutcome {
    Applied {
        proposal: ActionProposal,
        result: ActionResult,
    },
    Failed {
        proposal: ActionProposal,
        error: DispatchError,
    },
    /// 名称不在声明的动作里，未转发
    Dropped { name: String },
}

/// 一轮的结果
#[derive(Debug)]
pub enum TickOutcome {
    SampleFailed(String),
    DecisionFailed(DecisionError),
    Dispatched(Vec<DispatchOutcome>),
}

pub struct DecisionLoop {
    metrics: Arc<dyn MetricsSource>,
    decider: Arc<dyn DecisionPort>,
    transport: Arc<dyn ToolTransport>,
    actions: Vec<ActionSpec>,
    settings: LoopSettings,
    phase: LoopPhase,
    ticks: u64,
}

impl DecisionLoop {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        decider: Arc<dyn DecisionPort>,
        transport: Arc<dyn ToolTransport>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            metrics,
            decider,
            transport,
            actions: vec![ActionSpec::adjust_threshold()],
            settings,
            phase: LoopPhase::Idle,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn enter(&mut self, next: LoopPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = self.phase.as_str(), to = next.as_str(), "Unexpected phase transition");
        }
        tracing::trace!(from = self.phase.as_str(), to = next.as_str(), "phase");
        self.phase = next;
    }

    /// 执行完整的一轮
    pub async fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;

        self.enter(LoopPhase::Sampling);
        let metrics = match self.metrics.sample().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to sample metrics, skipping tick");
                self.enter(LoopPhase::Idle);
                return TickOutcome::SampleFailed(e);
            }
        };
        let context = SituationalContext::new(metrics);
        if let Some(cpu) = context.metric(CPU_USAGE_PERCENT) {
            tracing::info!(
                cpu_usage_percent = cpu,
                sampled_at = %context.sampled_at(),
                "Current CPU: {:.1}%",
                cpu
            );
        }

        self.enter(LoopPhase::Deciding);
        let decided = timeout(
            self.settings.decide_timeout,
            self.decider.decide(&context, &self.actions),
        )
        .await
        .unwrap_or(Err(DecisionError::Timeout(self.settings.decide_timeout)));
        let proposals = match decided {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Oracle call failed, skipping tick");
                self.enter(LoopPhase::Idle);
                return TickOutcome::DecisionFailed(e);
            }
        };
        let (_, _, total_tokens) = self.decider.token_usage();
        tracing::debug!(proposals = proposals.len(), total_tokens, "Oracle replied");
        if proposals.is_empty() {
            tracing::info!("Oracle decided no adjustment is needed");
        }

        self.enter(LoopPhase::Dispatching);
        let mut outcomes = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            outcomes.push(self.dispatch(proposal).await);
        }
        self.enter(LoopPhase::Idle);

        TickOutcome::Dispatched(outcomes)
    }

    async fn dispatch(&self, proposal: ActionProposal) -> DispatchOutcome {
        if !self.actions.iter().any(|a| a.name == proposal.name) {
            tracing::debug!(tool = %proposal.name, "Ignoring proposal for undeclared action");
            return DispatchOutcome::Dropped {
                name: proposal.name,
            };
        }

        tracing::info!(
            tool = %proposal.name,
            arguments = %proposal.arguments,
            "Oracle decision: calling {}",
            proposal.name
        );
        let called = timeout(
            self.settings.call_timeout,
            self.transport.call(&proposal.name, proposal.arguments.clone()),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout(self.settings.call_timeout)));

        match called {
            Ok(result) => {
                tracing::info!(
                    old_value = result.old_value,
                    new_value = result.new_value,
                    "Configuration updated"
                );
                DispatchOutcome::Applied { proposal, result }
            }
            Err(error) => {
                let attempted = proposal.arguments.get("value").cloned().unwrap_or_default();
                match &error {
                    DispatchError::Rejected { kind: Some(k), .. } if k.is_validation() => {
                        tracing::warn!(
                            kind = error.kind(),
                            value = %attempted,
                            error = %error,
                            "Tool rejected proposal"
                        )
                    }
                    _ => tracing::error!(
                        kind = error.kind(),
                        value = %attempted,
                        error = %error,
                        "Tool call failed"
                    ),
                }
                DispatchOutcome::Failed { proposal, error }
            }
        }
    }

    /// 按周期运行直到 shutdown 被取消；首轮在一个周期之后开始
    pub async fn run(mut self, shutdown: CancellationToken) {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = period.as_secs_f64(), "Decision loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!(ticks = self.ticks, "Decision loop stopped");
    }
}
