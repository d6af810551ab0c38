//! Simulated Market
//!
//! Stand-in for the live vault when no ledger is configured. Each tick nudges
//! every pool's rate by a bounded random step and clamps it into a plausible
//! band. Rates stay in integer Ray units the whole way through.
//!
//! The random source is injected so tests can replay a trajectory.

use alloy_primitives::U256;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cartographer::{PoolId, PoolQuote};
use crate::ray;

/// Direction of the last move, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPool {
    pub id: PoolId,
    pub protocol: String,
    /// Ray-scaled rate
    pub rate_raw: u128,
}

impl SimPool {
    pub fn new(id: &str, protocol: &str, percent: f64) -> Self {
        Self {
            id: PoolId::new(id),
            protocol: protocol.to_string(),
            rate_raw: ray_u128(percent),
        }
    }

    pub fn quote(&self) -> PoolQuote {
        PoolQuote::new(self.id.clone(), U256::from(self.rate_raw), true)
            .with_label(self.protocol.clone())
    }
}

/// Drift bounds, all in Ray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftBounds {
    pub max_step: u128,
    pub floor: u128,
    pub ceiling: u128,
    /// Moves inside +/- this band count as `Stable`
    pub trend_band: u128,
}

impl DriftBounds {
    pub fn from_percent(max_step: f64, floor: f64, ceiling: f64) -> Self {
        Self {
            max_step: ray_u128(max_step),
            floor: ray_u128(floor),
            ceiling: ray_u128(ceiling),
            trend_band: ray_u128(0.1),
        }
    }
}

impl Default for DriftBounds {
    fn default() -> Self {
        // +/-0.4% per tick, kept within 2%..8%
        Self::from_percent(0.4, 2.0, 8.0)
    }
}

/// One pool's rate change over a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateMove {
    pub pool_id: PoolId,
    pub from_raw: u128,
    pub to_raw: u128,
    pub trend: Trend,
}

pub struct SimulatedMarket<R> {
    pools: Vec<SimPool>,
    bounds: DriftBounds,
    rng: R,
}

impl<R: Rng> SimulatedMarket<R> {
    pub fn new(pools: Vec<SimPool>, bounds: DriftBounds, rng: R) -> Self {
        Self { pools, bounds, rng }
    }

    /// SparkLend / Aave V3 / Compound starting at 5.20 / 4.80 / 3.90 %
    pub fn default_pools() -> Vec<SimPool> {
        vec![
            SimPool::new("pool-a", "SparkLend", 5.2),
            SimPool::new("pool-b", "Aave V3", 4.8),
            SimPool::new("pool-c", "Compound", 3.9),
        ]
    }

    /// Advance every pool by one random step
    pub fn tick(&mut self) -> Vec<RateMove> {
        let max = self.bounds.max_step as i128;
        let floor = self.bounds.floor as i128;
        let ceiling = self.bounds.ceiling as i128;
        let band = self.bounds.trend_band as i128;

        let mut moves = Vec::with_capacity(self.pools.len());
        for pool in &mut self.pools {
            let delta: i128 = if max == 0 { 0 } else { self.rng.gen_range(-max..=max) };
            let from = pool.rate_raw;
            let to = (from as i128 + delta).clamp(floor, ceiling) as u128;

            let trend = if delta > band {
                Trend::Up
            } else if delta < -band {
                Trend::Down
            } else {
                Trend::Stable
            };
            pool.rate_raw = to;

            moves.push(RateMove {
                pool_id: pool.id.clone(),
                from_raw: from,
                to_raw: to,
                trend,
            });
        }
        moves
    }

    pub fn quotes(&self) -> Vec<PoolQuote> {
        self.pools.iter().map(SimPool::quote).collect()
    }

    pub fn rate_of(&self, pool_id: &PoolId) -> Option<U256> {
        self.pools
            .iter()
            .find(|p| &p.id == pool_id)
            .map(|p| U256::from(p.rate_raw))
    }
}

fn ray_u128(percent: f64) -> u128 {
    u128::try_from(ray::percent_to_ray(percent)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn market(seed: u64) -> SimulatedMarket<StdRng> {
        SimulatedMarket::new(
            SimulatedMarket::<StdRng>::default_pools(),
            DriftBounds::default(),
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = market(42);
        let mut b = market(42);
        for _ in 0..50 {
            assert_eq!(a.tick(), b.tick());
        }
        assert_eq!(a.pools, b.pools);
    }

    #[test]
    fn test_steps_bounded_and_clamped() {
        let bounds = DriftBounds::default();
        let mut m = market(7);
        for _ in 0..1_000 {
            for mv in m.tick() {
                let step = (mv.to_raw as i128 - mv.from_raw as i128).unsigned_abs();
                assert!(step <= bounds.max_step);
                assert!(mv.to_raw >= bounds.floor && mv.to_raw <= bounds.ceiling);
            }
        }
    }

    #[test]
    fn test_zero_step_is_frozen() {
        let bounds = DriftBounds::from_percent(0.0, 2.0, 8.0);
        let mut m = SimulatedMarket::new(
            SimulatedMarket::<StdRng>::default_pools(),
            bounds,
            StdRng::seed_from_u64(1),
        );
        let before = m.quotes();
        let moves = m.tick();
        assert_eq!(before, m.quotes());
        assert!(moves.iter().all(|mv| mv.trend == Trend::Stable));
    }

    #[test]
    fn test_default_pools() {
        let m = market(0);
        let quotes = m.quotes();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].display_name(), "SparkLend");
        assert_eq!(quotes[0].rate_percent(), "5.20");
        assert_eq!(m.rate_of(&PoolId::new("pool-c")), Some(ray::percent_to_ray(3.9)));
        assert_eq!(m.rate_of(&PoolId::new("pool-z")), None);
    }
}
