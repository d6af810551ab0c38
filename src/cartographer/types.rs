//! Snapshot types shared by the live reader and the simulated market

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ray;

/// Opaque pool identifier. Live pools use the checksummed address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(String);

impl PoolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Address> for PoolId {
    fn from(addr: Address) -> Self {
        Self(addr.to_checksum(None))
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pool's rate as read in a single polling cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolQuote {
    pub pool_id: PoolId,
    /// Rate scaled by 1e27
    pub rate_raw: U256,
    pub fetch_succeeded: bool,
    /// Human readable protocol name, display only
    pub label: Option<String>,
}

impl PoolQuote {
    pub fn new(pool_id: PoolId, rate_raw: U256, fetch_succeeded: bool) -> Self {
        Self {
            pool_id,
            rate_raw,
            fetch_succeeded,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => short_id(&self.pool_id),
        }
    }

    pub fn rate_percent(&self) -> String {
        ray::to_percent(self.rate_raw)
    }
}

/// Where a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotSource {
    Live,
    Simulated,
}

impl std::fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotSource::Live => write!(f, "LIVE"),
            SnapshotSource::Simulated => write!(f, "SIMULATED"),
        }
    }
}

/// One point-in-time read of the vault. Replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub active_pool_id: PoolId,
    pub best_pool_id: PoolId,
    pub best_rate_raw: U256,
    pub current_rate_raw: U256,
    /// The vault's own rebalance flag. Never true when best < current.
    pub should_rebalance: bool,
    pub rebalance_threshold_raw: U256,
    pub all_quotes: Vec<PoolQuote>,
    pub fetched_at: DateTime<Utc>,
    pub source: SnapshotSource,
}

impl VaultSnapshot {
    /// Look up a pool's quote by id
    pub fn quote(&self, pool_id: &PoolId) -> Option<&PoolQuote> {
        self.all_quotes.iter().find(|q| &q.pool_id == pool_id)
    }

    /// Display name for any pool id, falling back to a shortened id
    pub fn pool_name(&self, pool_id: &PoolId) -> String {
        self.quote(pool_id)
            .map(PoolQuote::display_name)
            .unwrap_or_else(|| short_id(pool_id))
    }

    /// Copy of this snapshot with the vault moved into `pool_id` at `rate_raw`
    pub fn with_active_pool(&self, pool_id: PoolId, rate_raw: U256) -> Self {
        let mut next = self.clone();
        next.active_pool_id = pool_id;
        next.current_rate_raw = rate_raw;
        next.should_rebalance = false;
        next
    }
}

/// `0x1DbaE6...6720` style shortening for addresses, identity otherwise
pub fn short_id(pool_id: &PoolId) -> String {
    let id = pool_id.as_str();
    if id.starts_with("0x") && id.len() > 14 && id.is_ascii() {
        format!("{}...{}", &id[..8], &id[id.len() - 4..])
    } else {
        id.to_string()
    }
}
