//! Settlement steps
//!
//! The orchestrator decides *when* to withdraw and supply; an executor
//! decides when each step is final.
//!
//! - `TimedSettlement`: fixed delay per leg, for the simulated market where
//!   nothing exists to confirm against
//! - `LedgerSettlement`: re-reads the vault until its `activePool()` shows
//!   the leg landed, failing the leg after a deadline

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::orchestrator::{RebalanceTask, SettlementStep};
use crate::cartographer::{PoolId, VaultFeed};
use crate::error::VaultError;

#[async_trait]
pub trait SettlementExecutor: Send + Sync {
    /// Resolve once `step` of `task` is final
    async fn execute(&self, step: SettlementStep, task: &RebalanceTask) -> Result<(), VaultError>;
}

// ============================================
// TIMED (SIMULATION)
// ============================================

/// Fixed delay per step
pub struct TimedSettlement {
    step_delay: Duration,
}

impl TimedSettlement {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl SettlementExecutor for TimedSettlement {
    async fn execute(&self, step: SettlementStep, task: &RebalanceTask) -> Result<(), VaultError> {
        debug!(
            "Settling {:?} for {} -> {} ({:?})",
            step, task.from_pool, task.to_pool, self.step_delay
        );
        tokio::time::sleep(self.step_delay).await;
        Ok(())
    }
}

// ============================================
// LEDGER CONFIRMATION (LIVE)
// ============================================

/// Confirms each leg against the vault's own view of its active pool.
///
/// The vault moves funds in a single callback, so the withdraw leg lands as
/// soon as the active pool leaves `from_pool` and the supply leg once it
/// equals `to_pool`.
pub struct LedgerSettlement {
    feed: Arc<dyn VaultFeed>,
    poll_every: Duration,
    deadline: Duration,
}

impl LedgerSettlement {
    pub fn new(feed: Arc<dyn VaultFeed>, poll_every: Duration, deadline: Duration) -> Self {
        Self {
            feed,
            poll_every,
            deadline,
        }
    }

    fn leg_landed(step: SettlementStep, task: &RebalanceTask, active: &PoolId) -> bool {
        match step {
            SettlementStep::Withdraw => active != &task.from_pool,
            SettlementStep::Supply => active == &task.to_pool,
        }
    }

    async fn wait_for(&self, step: SettlementStep, task: &RebalanceTask) {
        loop {
            match self.feed.fetch_snapshot().await {
                Ok(snapshot) if Self::leg_landed(step, task, &snapshot.active_pool_id) => {
                    debug!("{:?} confirmed, vault active in {}", step, snapshot.active_pool_id);
                    return;
                }
                Ok(snapshot) => trace!(
                    "{:?} pending, vault still active in {}",
                    step,
                    snapshot.active_pool_id
                ),
                Err(e) => debug!("Confirmation read failed: {}", e),
            }
            tokio::time::sleep(self.poll_every).await;
        }
    }
}

#[async_trait]
impl SettlementExecutor for LedgerSettlement {
    async fn execute(&self, step: SettlementStep, task: &RebalanceTask) -> Result<(), VaultError> {
        tokio::time::timeout(self.deadline, self.wait_for(step, task))
            .await
            .map_err(|_| {
                VaultError::Settlement(format!(
                    "{:?} not confirmed by the vault within {:?}",
                    step, self.deadline
                ))
            })
    }
}
