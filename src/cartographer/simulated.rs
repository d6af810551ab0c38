//! Simulated vault feed
//!
//! Wraps [`SimulatedMarket`] behind the same [`VaultFeed`] trait as the live
//! rate source. Every fetch advances the market by one drift tick and runs
//! the shared decision rule to fill in the vault's own fields.

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Mutex;
use tracing::trace;

use super::types::{PoolId, SnapshotSource, VaultSnapshot};
use super::VaultFeed;
use crate::brain::{decision, SimulatedMarket};
use crate::error::VaultError;
use crate::ray;

struct SimState<R> {
    market: SimulatedMarket<R>,
    active_pool: PoolId,
}

pub struct SimulatedVault<R> {
    state: Mutex<SimState<R>>,
    threshold_raw: U256,
}

impl<R: Rng + Send> SimulatedVault<R> {
    /// Fails when `active_pool` is not one of the market's pools
    pub fn new(
        market: SimulatedMarket<R>,
        active_pool: PoolId,
        threshold_raw: U256,
    ) -> Result<Self, VaultError> {
        if market.rate_of(&active_pool).is_none() {
            return Err(VaultError::ConfigError(format!(
                "simulated active pool {} is not in the market",
                active_pool
            )));
        }
        Ok(Self {
            state: Mutex::new(SimState {
                market,
                active_pool,
            }),
            threshold_raw,
        })
    }

    #[cfg(test)]
    pub fn active_pool(&self) -> PoolId {
        self.lock().active_pool.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState<R>> {
        // state is a plain value; a panicked holder cannot leave it half-written
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_snapshot(&self) -> Result<VaultSnapshot, VaultError> {
        let mut state = self.lock();
        for mv in state.market.tick() {
            trace!(
                "Simulated drift {}: {}% -> {}% ({:?})",
                mv.pool_id,
                ray::to_percent(U256::from(mv.from_raw)),
                ray::to_percent(U256::from(mv.to_raw)),
                mv.trend
            );
        }

        let all_quotes = state.market.quotes();
        let current_rate_raw = state
            .market
            .rate_of(&state.active_pool)
            .unwrap_or(U256::ZERO);
        let decision = decision::evaluate_quotes(&all_quotes, current_rate_raw, self.threshold_raw)?;

        Ok(VaultSnapshot {
            active_pool_id: state.active_pool.clone(),
            best_pool_id: decision.best_pool_id,
            best_rate_raw: decision.best_rate_raw,
            current_rate_raw,
            should_rebalance: decision.should_rebalance,
            rebalance_threshold_raw: self.threshold_raw,
            all_quotes,
            fetched_at: Utc::now(),
            source: SnapshotSource::Simulated,
        })
    }
}

#[async_trait]
impl<R: Rng + Send> VaultFeed for SimulatedVault<R> {
    async fn fetch_snapshot(&self) -> Result<VaultSnapshot, VaultError> {
        self.next_snapshot()
    }

    fn apply_settlement(&self, pool_id: &PoolId, _rate_raw: U256) {
        self.lock().active_pool = pool_id.clone();
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Simulated
    }
}
