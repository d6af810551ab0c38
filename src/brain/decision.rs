//! Rebalance Decision
//!
//! Pure rule shared by the live and simulated paths:
//!
//! ```text
//! spread          = best_rate - current_rate   (saturating, never negative)
//! should_rebalance = spread > threshold
//! ```
//!
//! All comparisons run on raw Ray integers. Display strings never feed back
//! into this module.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::cartographer::{PoolId, PoolQuote, VaultSnapshot};
use crate::error::VaultError;
use crate::ray;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub best_pool_id: PoolId,
    pub best_rate_raw: U256,
    pub current_rate_raw: U256,
    pub spread_raw: U256,
    pub threshold_raw: U256,
    pub should_rebalance: bool,
    /// Set when no pool quote could be used; `should_rebalance` is false
    pub insufficient_data: bool,
}

impl Decision {
    /// Degraded decision for a snapshot where every pool read failed
    pub fn insufficient_data(snapshot: &VaultSnapshot) -> Self {
        Self {
            best_pool_id: snapshot.active_pool_id.clone(),
            best_rate_raw: snapshot.current_rate_raw,
            current_rate_raw: snapshot.current_rate_raw,
            spread_raw: U256::ZERO,
            threshold_raw: snapshot.rebalance_threshold_raw,
            should_rebalance: false,
            insufficient_data: true,
        }
    }

    /// True when the rule fires and the winner is not the pool we are in.
    ///
    /// The second half guards against the active pool being reported as
    /// best while the spread against a stale current rate crosses the line.
    pub fn targets_new_pool(&self, active_pool: &PoolId) -> bool {
        self.should_rebalance && &self.best_pool_id != active_pool
    }

    pub fn spread_percent(&self) -> String {
        ray::to_percent(self.spread_raw)
    }

    pub fn threshold_percent(&self) -> String {
        ray::to_percent(self.threshold_raw)
    }
}

/// Highest-rate pool among successful quotes. Ties keep the first seen.
pub fn select_best(quotes: &[PoolQuote]) -> Option<&PoolQuote> {
    let mut best: Option<&PoolQuote> = None;
    for quote in quotes.iter().filter(|q| q.fetch_succeeded) {
        match best {
            Some(current) if quote.rate_raw <= current.rate_raw => {}
            _ => best = Some(quote),
        }
    }
    best
}

/// Apply the threshold rule to a set of quotes
pub fn evaluate_quotes(
    quotes: &[PoolQuote],
    current_rate_raw: U256,
    threshold_raw: U256,
) -> Result<Decision, VaultError> {
    let best = select_best(quotes).ok_or(VaultError::NoValidQuotes)?;
    let spread_raw = best.rate_raw.saturating_sub(current_rate_raw);

    Ok(Decision {
        best_pool_id: best.pool_id.clone(),
        best_rate_raw: best.rate_raw,
        current_rate_raw,
        spread_raw,
        threshold_raw,
        should_rebalance: spread_raw > threshold_raw,
        insufficient_data: false,
    })
}

/// Evaluate a snapshot against its own threshold
pub fn evaluate(snapshot: &VaultSnapshot) -> Result<Decision, VaultError> {
    evaluate_quotes(
        &snapshot.all_quotes,
        snapshot.current_rate_raw,
        snapshot.rebalance_threshold_raw,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::SnapshotSource;
    use crate::ray::percent_to_ray;
    use chrono::Utc;

    fn quote(id: &str, pct: f64, ok: bool) -> PoolQuote {
        PoolQuote::new(PoolId::new(id), percent_to_ray(pct), ok)
    }

    fn snapshot(quotes: Vec<PoolQuote>, active: &str, threshold_pct: f64) -> VaultSnapshot {
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

    fn abc() -> Vec<PoolQuote> {
        vec![
            quote("A", 5.20, true),
            quote("B", 4.80, true),
            quote("C", 3.90, true),
        ]
    }

    #[test]
    fn test_active_best_pool_never_rebalances() {
        let decision = evaluate(&snapshot(abc(), "A", 2.0)).unwrap();
        assert_eq!(decision.best_pool_id, PoolId::new("A"));
        assert_eq!(decision.spread_raw, U256::ZERO);
        assert!(!decision.should_rebalance);
    }

    #[test]
    fn test_spread_above_threshold_triggers() {
        let decision = evaluate(&snapshot(abc(), "C", 1.0)).unwrap();
        assert!(decision.should_rebalance);
        assert_eq!(decision.best_pool_id, PoolId::new("A"));
        assert_eq!(decision.spread_percent(), "1.30");
        assert!(decision.targets_new_pool(&PoolId::new("C")));
    }

    #[test]
    fn test_spread_equal_to_threshold_does_not_trigger() {
        let quotes = vec![quote("A", 5.0, true), quote("B", 3.0, true)];
        let decision = evaluate(&snapshot(quotes, "B", 2.0)).unwrap();
        assert_eq!(decision.spread_raw, decision.threshold_raw);
        assert!(!decision.should_rebalance);
    }

    #[test]
    fn test_failed_quote_never_selected() {
        let mut quotes = abc();
        quotes.push(quote("D", 9.99, false));
        let decision = evaluate(&snapshot(quotes, "C", 1.0)).unwrap();
        assert_eq!(decision.best_pool_id, PoolId::new("A"));
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let quotes = vec![
            quote("C", 3.90, true),
            quote("B", 5.20, true),
            quote("A", 5.20, true),
        ];
        let best = select_best(&quotes).unwrap();
        assert_eq!(best.pool_id, PoolId::new("B"));
    }

    #[test]
    fn test_all_failed_is_no_valid_quotes() {
        let quotes = vec![quote("A", 5.2, false), quote("B", 4.8, false)];
        let snap = snapshot(quotes, "A", 2.0);
        assert_eq!(evaluate(&snap), Err(VaultError::NoValidQuotes));

        let degraded = Decision::insufficient_data(&snap);
        assert!(degraded.insufficient_data);
        assert!(!degraded.should_rebalance);
    }

    #[test]
    fn test_lower_best_rate_gives_zero_spread() {
        // current rate is stale and above every quote
        let quotes = vec![quote("A", 3.0, true)];
        let decision = evaluate_quotes(&quotes, percent_to_ray(6.0), U256::ZERO).unwrap();
        assert_eq!(decision.spread_raw, U256::ZERO);
        assert!(!decision.should_rebalance);
    }

    #[test]
    fn test_decision_is_exactly_the_threshold_predicate() {
        let rates = [2.0, 2.5, 3.1, 4.0, 4.75, 5.2, 6.0, 7.9];
        let thresholds = [0.0, 0.5, 1.0, 2.0, 3.0];
        for &best in &rates {
            for &current in &rates {
                for &threshold in &thresholds {
                    let quotes = vec![quote("X", best, true)];
                    let d = evaluate_quotes(
                        &quotes,
                        percent_to_ray(current),
                        percent_to_ray(threshold),
                    )
                    .unwrap();
                    let expected = d.best_rate_raw > d.current_rate_raw
                        && d.best_rate_raw - d.current_rate_raw > d.threshold_raw;
                    assert_eq!(d.should_rebalance, expected, "best {best} current {current} threshold {threshold}");
                    if d.should_rebalance {
                        assert!(d.best_rate_raw >= d.current_rate_raw);
                    }
                }
            }
        }
    }
}
