//! Rebalance Orchestrator
//!
//! ```text
//! Idle -> ConditionMet -> Withdrawing -> Supplying -> Settled -> Idle
//!              |
//!              +-> Idle   (condition cleared during debounce)
//! ```
//!
//! The orchestrator owns no timers. The engine calls one method per event
//! (decision, debounce deadline, step confirmation) and each call performs at
//! most one transition. At most one task exists; a new condition while a
//! task is in flight is dropped, not queued.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::activity::{ActivityLog, SourceChain};
use crate::brain::Decision;
use crate::cartographer::{PoolId, VaultSnapshot};
use crate::ray;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    ConditionMet,
    Withdrawing,
    Supplying,
    Settled,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "IDLE"),
            Phase::ConditionMet => write!(f, "CONDITION_MET"),
            Phase::Withdrawing => write!(f, "WITHDRAWING"),
            Phase::Supplying => write!(f, "SUPPLYING"),
            Phase::Settled => write!(f, "SETTLED"),
        }
    }
}

/// The two on-ledger legs of a rebalance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStep {
    Withdraw,
    Supply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceTask {
    pub phase: Phase,
    pub from_pool: PoolId,
    pub to_pool: PoolId,
    pub from_name: String,
    pub to_name: String,
    pub started_at: DateTime<Utc>,
    pub target_rate: U256,
    pub spread_raw: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: Phase,
    pub to: Phase,
}

/// Outcome of a finished rebalance, applied to the vault view by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub from_pool: PoolId,
    pub to_pool: PoolId,
    pub rate_raw: U256,
}

pub struct RebalanceOrchestrator {
    task: Option<RebalanceTask>,
    debounce: Duration,
    debounce_deadline: Option<Instant>,
}

impl RebalanceOrchestrator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            task: None,
            debounce,
            debounce_deadline: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.task.as_ref().map(|t| t.phase).unwrap_or(Phase::Idle)
    }

    pub fn task(&self) -> Option<&RebalanceTask> {
        self.task.as_ref()
    }

    /// When the engine should call [`on_debounce_elapsed`](Self::on_debounce_elapsed)
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce_deadline
    }

    /// Feed a fresh decision
    pub fn on_decision(
        &mut self,
        decision: &Decision,
        snapshot: &VaultSnapshot,
        now: Instant,
        log: &mut ActivityLog,
    ) -> Option<PhaseChange> {
        let wants_move = decision.targets_new_pool(&snapshot.active_pool_id);

        match self.phase() {
            Phase::Idle if wants_move => {
                self.task = Some(RebalanceTask {
                    phase: Phase::ConditionMet,
                    from_pool: snapshot.active_pool_id.clone(),
                    to_pool: decision.best_pool_id.clone(),
                    from_name: snapshot.pool_name(&snapshot.active_pool_id),
                    to_name: snapshot.pool_name(&decision.best_pool_id),
                    started_at: Utc::now(),
                    target_rate: decision.best_rate_raw,
                    spread_raw: decision.spread_raw,
                });
                self.debounce_deadline = Some(now + self.debounce);

                log.record(
                    SourceChain::Origin,
                    "Logic Check",
                    format!(
                        "Rate Diff {}% > {}%. Initiating Callback...",
                        decision.spread_percent(),
                        decision.threshold_percent()
                    ),
                );
                Some(self.change(Phase::Idle, Phase::ConditionMet))
            }
            Phase::ConditionMet if !wants_move => {
                self.cancel(log, "condition cleared during debounce")
            }
            Phase::Idle | Phase::ConditionMet => None,
            busy => {
                if wants_move {
                    debug!("Rebalance condition ignored, task already {}", busy);
                }
                None
            }
        }
    }

    /// Debounce window is over: commit to the move or stand down.
    ///
    /// `latest` is the most recent decision. The target follows it, so a
    /// different winner that emerged during the window is the one supplied.
    pub fn on_debounce_elapsed(
        &mut self,
        latest: Option<&Decision>,
        snapshot: &VaultSnapshot,
        now: Instant,
        log: &mut ActivityLog,
    ) -> Option<PhaseChange> {
        if self.phase() != Phase::ConditionMet {
            return None;
        }
        match self.debounce_deadline {
            Some(deadline) if deadline <= now => {}
            _ => return None,
        }
        self.debounce_deadline = None;

        let decision = match latest {
            Some(d) if d.targets_new_pool(&snapshot.active_pool_id) => d,
            _ => return self.cancel(log, "condition cleared before execution"),
        };

        let task = self.task.as_mut()?;
        task.to_pool = decision.best_pool_id.clone();
        task.to_name = snapshot.pool_name(&decision.best_pool_id);
        task.target_rate = decision.best_rate_raw;
        task.spread_raw = decision.spread_raw;
        task.phase = Phase::Withdrawing;

        log.record(
            SourceChain::Destination,
            "Vault Action",
            format!("Withdrawing from {} → Supplying to {}", task.from_name, task.to_name),
        );
        Some(self.change(Phase::ConditionMet, Phase::Withdrawing))
    }

    /// A settlement leg is final
    pub fn on_step_confirmed(&mut self, step: SettlementStep, log: &mut ActivityLog) -> Option<PhaseChange> {
        let task = self.task.as_mut()?;

        match (task.phase, step) {
            (Phase::Withdrawing, SettlementStep::Withdraw) => {
                task.phase = Phase::Supplying;
                log.record(
                    SourceChain::Destination,
                    "Vault Action",
                    format!("Withdrawn from {}. Supplying to {}", task.from_name, task.to_name),
                );
                Some(self.change(Phase::Withdrawing, Phase::Supplying))
            }
            (Phase::Supplying, SettlementStep::Supply) => {
                task.phase = Phase::Settled;
                log.record(
                    SourceChain::Destination,
                    "Rebalance Complete",
                    format!(
                        "Vault now active in {} at {}% APY",
                        task.to_name,
                        ray::to_percent(task.target_rate)
                    ),
                );
                Some(self.change(Phase::Supplying, Phase::Settled))
            }
            (phase, step) => {
                debug!("Ignoring {:?} confirmation while {}", step, phase);
                None
            }
        }
    }

    /// A settlement leg failed; the task is dropped
    pub fn on_step_failed(
        &mut self,
        step: SettlementStep,
        reason: &str,
        log: &mut ActivityLog,
    ) -> Option<PhaseChange> {
        let from = self.phase();
        let expected = match step {
            SettlementStep::Withdraw => Phase::Withdrawing,
            SettlementStep::Supply => Phase::Supplying,
        };
        if from != expected {
            return None;
        }

        self.task = None;
        log.record(
            SourceChain::Destination,
            "Rebalance Failed",
            format!("{:?} step failed: {}", step, reason),
        );
        Some(self.change(from, Phase::Idle))
    }

    /// Close out a settled task and hand the result to the caller
    pub fn finish_settlement(&mut self, log: &mut ActivityLog) -> Option<Settlement> {
        if self.phase() != Phase::Settled {
            return None;
        }
        let task = self.task.take()?;

        log.record(
            SourceChain::Destination,
            "Vault State",
            format!("Active pool set to {}", task.to_name),
        );
        self.change(Phase::Settled, Phase::Idle);

        Some(Settlement {
            from_pool: task.from_pool,
            to_pool: task.to_pool,
            rate_raw: task.target_rate,
        })
    }

    fn cancel(&mut self, log: &mut ActivityLog, reason: &str) -> Option<PhaseChange> {
        self.task = None;
        self.debounce_deadline = None;
        log.record(SourceChain::Origin, "Logic Check", format!("Rebalance cancelled: {}", reason));
        Some(self.change(Phase::ConditionMet, Phase::Idle))
    }

    fn change(&self, from: Phase, to: Phase) -> PhaseChange {
        debug!("Rebalance phase {} -> {}", from, to);
        PhaseChange { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::decision;
    use crate::cartographer::{PoolQuote, SnapshotSource};
    use crate::ray::percent_to_ray;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn snapshot(rates: &[(&str, f64)], active: &str, threshold_pct: f64) -> VaultSnapshot {
        let quotes: Vec<PoolQuote> = rates
            .iter()
            .map(|(id, pct)| PoolQuote::new(PoolId::new(*id), percent_to_ray(*pct), true))
            .collect();
        let active_id = PoolId::new(active);
        let current = quotes
            .iter()
            .find(|q| q.pool_id == active_id)
            .map(|q| q.rate_raw)
            .unwrap_or(U256::ZERO);
        VaultSnapshot {
            active_pool_id: active_id.clone(),
            best_pool_id: active_id,
            best_rate_raw: current,
            current_rate_raw: current,
            should_rebalance: false,
            rebalance_threshold_raw: percent_to_ray(threshold_pct),
            all_quotes: quotes,
            fetched_at: Utc::now(),
            source: SnapshotSource::Simulated,
        }
    }

    fn wide_spread() -> VaultSnapshot {
        snapshot(&[("A", 6.5), ("B", 4.8), ("C", 3.9)], "C", 2.0)
    }

    fn narrow_spread() -> VaultSnapshot {
        snapshot(&[("A", 4.5), ("B", 4.8), ("C", 3.9)], "C", 2.0)
    }

    /// Drive a task all the way to `Withdrawing`
    fn start_withdrawing(orch: &mut RebalanceOrchestrator, log: &mut ActivityLog) -> Instant {
        let snap = wide_spread();
        let d = decision::evaluate(&snap).unwrap();
        let t0 = Instant::now();
        orch.on_decision(&d, &snap, t0, log).unwrap();
        orch.on_debounce_elapsed(Some(&d), &snap, t0 + DEBOUNCE, log).unwrap();
        t0
    }

    #[test]
    fn test_full_lifecycle() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        let snap = wide_spread();
        let d = decision::evaluate(&snap).unwrap();
        let t0 = Instant::now();

        let change = orch.on_decision(&d, &snap, t0, &mut log).unwrap();
        assert_eq!(change, PhaseChange { from: Phase::Idle, to: Phase::ConditionMet });
        assert_eq!(orch.debounce_deadline(), Some(t0 + DEBOUNCE));

        // deadline not reached yet
        assert!(orch.on_debounce_elapsed(Some(&d), &snap, t0, &mut log).is_none());

        let change = orch.on_debounce_elapsed(Some(&d), &snap, t0 + DEBOUNCE, &mut log).unwrap();
        assert_eq!(change.to, Phase::Withdrawing);

        assert_eq!(orch.on_step_confirmed(SettlementStep::Withdraw, &mut log).unwrap().to, Phase::Supplying);
        assert_eq!(orch.on_step_confirmed(SettlementStep::Supply, &mut log).unwrap().to, Phase::Settled);

        let settlement = orch.finish_settlement(&mut log).unwrap();
        assert_eq!(settlement.from_pool, PoolId::new("C"));
        assert_eq!(settlement.to_pool, PoolId::new("A"));
        assert_eq!(settlement.rate_raw, percent_to_ray(6.5));
        assert_eq!(orch.phase(), Phase::Idle);

        // one entry per transition
        assert_eq!(log.len(), 5);
        assert_eq!(log.latest().unwrap().event_type, "Vault State");
    }

    #[test]
    fn test_active_pool_as_best_is_not_a_move() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        let snap = wide_spread();
        let mut d = decision::evaluate(&snap).unwrap();
        d.best_pool_id = PoolId::new("C");

        assert!(orch.on_decision(&d, &snap, Instant::now(), &mut log).is_none());
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[test]
    fn test_condition_clears_during_debounce() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        let wide = wide_spread();
        let d_wide = decision::evaluate(&wide).unwrap();
        let t0 = Instant::now();
        orch.on_decision(&d_wide, &wide, t0, &mut log).unwrap();

        let narrow = narrow_spread();
        let d_narrow = decision::evaluate(&narrow).unwrap();
        let change = orch.on_decision(&d_narrow, &narrow, t0, &mut log).unwrap();

        assert_eq!(change, PhaseChange { from: Phase::ConditionMet, to: Phase::Idle });
        assert!(orch.task().is_none());
        assert!(orch.debounce_deadline().is_none());
    }

    #[test]
    fn test_condition_cleared_at_deadline() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        let wide = wide_spread();
        let d_wide = decision::evaluate(&wide).unwrap();
        let t0 = Instant::now();
        orch.on_decision(&d_wide, &wide, t0, &mut log).unwrap();

        let narrow = narrow_spread();
        let d_narrow = decision::evaluate(&narrow).unwrap();
        let change = orch
            .on_debounce_elapsed(Some(&d_narrow), &narrow, t0 + DEBOUNCE, &mut log)
            .unwrap();
        assert_eq!(change.to, Phase::Idle);
    }

    #[test]
    fn test_new_condition_while_withdrawing_is_noop() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        start_withdrawing(&mut orch, &mut log);
        let before = orch.task().cloned();

        // B now looks even better; still ignored
        let snap = snapshot(&[("A", 6.5), ("B", 7.9), ("C", 3.9)], "C", 2.0);
        let d = decision::evaluate(&snap).unwrap();
        assert!(orch.on_decision(&d, &snap, Instant::now(), &mut log).is_none());

        assert_eq!(orch.phase(), Phase::Withdrawing);
        assert_eq!(orch.task().cloned(), before);
    }

    #[test]
    fn test_out_of_order_confirmation_ignored() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        start_withdrawing(&mut orch, &mut log);

        assert!(orch.on_step_confirmed(SettlementStep::Supply, &mut log).is_none());
        assert!(orch.finish_settlement(&mut log).is_none());
        assert_eq!(orch.phase(), Phase::Withdrawing);
    }

    #[test]
    fn test_step_failure_returns_to_idle() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        start_withdrawing(&mut orch, &mut log);

        assert!(orch.on_step_failed(SettlementStep::Supply, "wrong leg", &mut log).is_none());
        let change = orch.on_step_failed(SettlementStep::Withdraw, "reverted", &mut log).unwrap();
        assert_eq!(change, PhaseChange { from: Phase::Withdrawing, to: Phase::Idle });
        assert_eq!(log.latest().unwrap().event_type, "Rebalance Failed");
    }

    #[test]
    fn test_target_follows_latest_decision() {
        let mut orch = RebalanceOrchestrator::new(DEBOUNCE);
        let mut log = ActivityLog::new();
        let wide = wide_spread();
        let d = decision::evaluate(&wide).unwrap();
        let t0 = Instant::now();
        orch.on_decision(&d, &wide, t0, &mut log).unwrap();

        let shifted = snapshot(&[("A", 6.5), ("B", 7.0), ("C", 3.9)], "C", 2.0);
        let d2 = decision::evaluate(&shifted).unwrap();
        orch.on_debounce_elapsed(Some(&d2), &shifted, t0 + DEBOUNCE, &mut log).unwrap();

        assert_eq!(orch.task().unwrap().to_pool, PoolId::new("B"));
    }
}
