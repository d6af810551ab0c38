//! The Cartographer (Vault Reads)
//!
//! Responsible for:
//! - Choosing an RPC endpoint and failing over when one is down
//! - Reading pool rates and vault state into a `VaultSnapshot`
//! - Providing a simulated feed when no live vault is configured

mod endpoints;
mod rate_source;
mod simulated;
mod types;

use alloy_primitives::U256;
use async_trait::async_trait;

pub use endpoints::EndpointPool;
pub use rate_source::{AlloyVaultReader, RateSource};
pub use simulated::SimulatedVault;
pub use types::{PoolId, PoolQuote, SnapshotSource, VaultSnapshot};

use crate::error::VaultError;

/// Anything the engine can poll for vault snapshots
#[async_trait]
pub trait VaultFeed: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<VaultSnapshot, VaultError>;

    /// Told when a rebalance settles. Live feeds ignore this; the next ledger
    /// read is authoritative.
    fn apply_settlement(&self, _pool_id: &PoolId, _rate_raw: U256) {}

    fn kind(&self) -> SnapshotSource;
}
