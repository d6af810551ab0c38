//! Rate Source - vault reads with endpoint failover
//!
//! Each cycle performs the four vault view calls against one endpoint as a
//! single unit. Any failure (transport, timeout, decode, revert) moves on to
//! the next endpoint. A snapshot is only produced when all four reads
//! succeed against the same endpoint.
//!
//! The four calls are not pinned to one block, so a snapshot can straddle a
//! block boundary. That window is accepted.

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::endpoints::EndpointPool;
use super::types::{PoolId, PoolQuote, SnapshotSource, VaultSnapshot};
use super::VaultFeed;
use crate::error::VaultError;

// ============================================
// VAULT INTERFACE
// ============================================

sol! {
    /// AutoYieldVault view surface
    #[derive(Debug)]
    interface IAutoYieldVault {
        function getBestPool() external view returns (
            address bestPool, uint256 bestRate, uint256 currentRate, bool shouldRebalance
        );
        function getAllPoolRates() external view returns (
            address[] memory pools, uint256[] memory rates, bool[] memory successes
        );
        function activePool() external view returns (address);
        function rebalanceThresholdRay() external view returns (uint256);
    }
}

/// Raw results of the four vault calls, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRead {
    pub best_pool: Address,
    pub best_rate: U256,
    pub current_rate: U256,
    pub should_rebalance: bool,
    pub pools: Vec<Address>,
    pub rates: Vec<U256>,
    pub successes: Vec<bool>,
    pub active_pool: Address,
    pub threshold: U256,
}

/// Reads the vault through one specific endpoint
#[async_trait]
pub trait VaultReader: Send + Sync {
    async fn read_vault(&self, endpoint: &str) -> Result<VaultRead, VaultError>;
}

// ============================================
// ALLOY READER
// ============================================

/// Live reader issuing `eth_call`s through an alloy HTTP provider
pub struct AlloyVaultReader {
    vault: Address,
    request_timeout: Duration,
}

impl AlloyVaultReader {
    pub fn new(vault: Address, request_timeout: Duration) -> Self {
        Self {
            vault,
            request_timeout,
        }
    }

    async fn call<P, C>(&self, provider: &P, endpoint: &str, call: C) -> Result<C::Return, VaultError>
    where
        P: Provider,
        C: SolCall + Send,
    {
        let tx = TransactionRequest::default()
            .to(self.vault)
            .input(call.abi_encode().into());

        let result = tokio::time::timeout(self.request_timeout, async { provider.call(tx).await })
            .await
            .map_err(|_| VaultError::EndpointUnreachable {
                endpoint: endpoint.to_string(),
                reason: format!("{} timed out after {:?}", C::SIGNATURE, self.request_timeout),
            })?
            .map_err(|e| VaultError::EndpointUnreachable {
                endpoint: endpoint.to_string(),
                reason: format!("{} failed: {}", C::SIGNATURE, e),
            })?;

        C::abi_decode_returns(&result).map_err(|e| VaultError::DecodeError {
            endpoint: endpoint.to_string(),
            reason: format!("{}: {}", C::SIGNATURE, e),
        })
    }
}

#[async_trait]
impl VaultReader for AlloyVaultReader {
    async fn read_vault(&self, endpoint: &str) -> Result<VaultRead, VaultError> {
        let provider = match endpoint.parse() {
            Ok(url) => ProviderBuilder::new().connect_http(url),
            Err(e) => {
                return Err(VaultError::EndpointUnreachable {
                    endpoint: endpoint.to_string(),
                    reason: format!("invalid URL: {}", e),
                })
            }
        };

        let best = self
            .call(&provider, endpoint, IAutoYieldVault::getBestPoolCall {})
            .await?;
        let rates = self
            .call(&provider, endpoint, IAutoYieldVault::getAllPoolRatesCall {})
            .await?;
        let active_pool = self
            .call(&provider, endpoint, IAutoYieldVault::activePoolCall {})
            .await?;
        let threshold = self
            .call(&provider, endpoint, IAutoYieldVault::rebalanceThresholdRayCall {})
            .await?;

        Ok(VaultRead {
            best_pool: best.bestPool,
            best_rate: best.bestRate,
            current_rate: best.currentRate,
            should_rebalance: best.shouldRebalance,
            pools: rates.pools,
            rates: rates.rates,
            successes: rates.successes,
            active_pool,
            threshold,
        })
    }
}

// ============================================
// RATE SOURCE
// ============================================

pub struct RateSource<R> {
    endpoints: Arc<EndpointPool>,
    reader: R,
    labels: HashMap<PoolId, String>,
}

impl<R: VaultReader> RateSource<R> {
    pub fn new(endpoints: Arc<EndpointPool>, reader: R) -> Self {
        Self {
            endpoints,
            reader,
            labels: HashMap::new(),
        }
    }

    /// Attach display names to known pool addresses
    pub fn with_labels(mut self, labels: HashMap<PoolId, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Try every endpoint once, starting from the last one that worked
    pub async fn fetch_snapshot(&self) -> Result<VaultSnapshot, VaultError> {
        let attempts = self.endpoints.len();
        let mut last_error: Option<VaultError> = None;

        for attempt in 0..attempts {
            let (index, endpoint) = self.endpoints.select_endpoint(attempt);
            let start = Instant::now();

            let result = self
                .reader
                .read_vault(endpoint)
                .await
                .and_then(|read| self.build_snapshot(endpoint, read));

            match result {
                Ok(snapshot) => {
                    self.endpoints.record_success(index);
                    debug!(
                        "Vault snapshot from {} in {:?} ({} pools)",
                        endpoint,
                        start.elapsed(),
                        snapshot.all_quotes.len()
                    );
                    return Ok(snapshot);
                }
                Err(e) if e.is_retryable() => {
                    warn!("RPC {} failed (attempt {}/{}): {}", endpoint, attempt + 1, attempts, e);
                    last_error = Some(e);
                }
                // another endpoint would give the same answer
                Err(e) => return Err(e),
            }
        }

        Err(VaultError::AllEndpointsUnavailable {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoint attempted".to_string()),
        })
    }

    fn build_snapshot(&self, endpoint: &str, read: VaultRead) -> Result<VaultSnapshot, VaultError> {
        if read.pools.len() != read.rates.len() || read.pools.len() != read.successes.len() {
            return Err(VaultError::DecodeError {
                endpoint: endpoint.to_string(),
                reason: format!(
                    "getAllPoolRates length mismatch: {} pools, {} rates, {} flags",
                    read.pools.len(),
                    read.rates.len(),
                    read.successes.len()
                ),
            });
        }
        if read.pools.is_empty() {
            return Err(VaultError::DecodeError {
                endpoint: endpoint.to_string(),
                reason: "getAllPoolRates returned no pools".to_string(),
            });
        }

        let all_quotes: Vec<PoolQuote> = read
            .pools
            .iter()
            .zip(read.rates.iter())
            .zip(read.successes.iter())
            .map(|((pool, rate), ok)| {
                let pool_id = PoolId::from(*pool);
                let quote = PoolQuote::new(pool_id.clone(), *rate, *ok);
                match self.labels.get(&pool_id) {
                    Some(label) => quote.with_label(label.clone()),
                    None => quote,
                }
            })
            .collect();

        trace!("Raw vault read from {}: {:?}", endpoint, read);

        Ok(VaultSnapshot {
            active_pool_id: PoolId::from(read.active_pool),
            best_pool_id: PoolId::from(read.best_pool),
            best_rate_raw: read.best_rate,
            current_rate_raw: read.current_rate,
            should_rebalance: read.should_rebalance && read.best_rate >= read.current_rate,
            rebalance_threshold_raw: read.threshold,
            all_quotes,
            fetched_at: Utc::now(),
            source: SnapshotSource::Live,
        })
    }
}

#[async_trait]
impl<R: VaultReader> VaultFeed for RateSource<R> {
    async fn fetch_snapshot(&self) -> Result<VaultSnapshot, VaultError> {
        RateSource::fetch_snapshot(self).await
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Live
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ray::percent_to_ray;
    use alloy_primitives::address;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    const AAVE: Address = address!("1DbaE63b3a7dd56438eCd25c1816d53E519b6720");
    const SPARK: Address = address!("548a8308464bDF1F96409ef684537137bcd0C7E2");

    fn endpoints() -> Vec<String> {
        (0..4).map(|i| format!("https://rpc{}.example", i)).collect()
    }

    fn sample_read() -> VaultRead {
        VaultRead {
            best_pool: SPARK,
            best_rate: percent_to_ray(5.2),
            current_rate: percent_to_ray(4.8),
            should_rebalance: false,
            pools: vec![AAVE, SPARK],
            rates: vec![percent_to_ray(4.8), percent_to_ray(5.2)],
            successes: vec![true, true],
            active_pool: AAVE,
            threshold: percent_to_ray(0.5),
        }
    }

    /// Fails for every endpoint in `down`, records call order
    struct MockReader {
        down: HashSet<String>,
        read: VaultRead,
        calls: Mutex<Vec<String>>,
        /// Returned by every endpoint instead of a read
        fail_with: Option<VaultError>,
    }

    impl MockReader {
        fn new(down: &[usize], read: VaultRead) -> Self {
            Self {
                down: down.iter().map(|i| format!("https://rpc{}.example", i)).collect(),
                read,
                calls: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VaultReader for MockReader {
        async fn read_vault(&self, endpoint: &str) -> Result<VaultRead, VaultError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            if self.down.contains(endpoint) {
                return Err(VaultError::EndpointUnreachable {
                    endpoint: endpoint.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self.read.clone())
        }
    }

    fn source(reader: MockReader) -> RateSource<MockReader> {
        let pool = Arc::new(EndpointPool::new(endpoints()).unwrap());
        RateSource::new(pool, reader)
    }

    #[tokio::test]
    async fn test_failover_records_last_good_endpoint() {
        let source = source(MockReader::new(&[0, 1], sample_read()));

        let snapshot = assert_ok!(source.fetch_snapshot().await);
        assert_eq!(snapshot.all_quotes.len(), 2);
        assert_eq!(source.endpoints.preferred_index(), 2);
        assert_eq!(
            source.reader.calls(),
            vec!["https://rpc0.example", "https://rpc1.example", "https://rpc2.example"]
        );

        // next cycle starts at the endpoint that just worked
        assert_ok!(source.fetch_snapshot().await);
        assert_eq!(source.reader.calls()[3], "https://rpc2.example");
    }

    #[tokio::test]
    async fn test_all_endpoints_down() {
        let source = source(MockReader::new(&[0, 1, 2, 3], sample_read()));

        let err = assert_err!(source.fetch_snapshot().await);
        match err {
            VaultError::AllEndpointsUnavailable { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("rpc3.example"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(source.reader.calls().len(), 4);
        assert_eq!(source.endpoints.preferred_index(), 0);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_decode_error_and_retried() {
        let mut read = sample_read();
        read.successes.pop();
        let source = source(MockReader::new(&[], read));

        let err = assert_err!(source.fetch_snapshot().await);
        assert!(matches!(err, VaultError::AllEndpointsUnavailable { attempts: 4, .. }));
        assert_eq!(source.reader.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_failover() {
        let mut reader = MockReader::new(&[], sample_read());
        reader.fail_with = Some(VaultError::ConfigError("vault not deployed".to_string()));
        let source = source(reader);

        let err = assert_err!(source.fetch_snapshot().await);
        assert_eq!(err, VaultError::ConfigError("vault not deployed".to_string()));
        assert_eq!(source.reader.calls(), vec!["https://rpc0.example"]);
        assert_eq!(source.endpoints.preferred_index(), 0);
    }

    #[tokio::test]
    async fn test_empty_pool_list_rejected() {
        let mut read = sample_read();
        read.pools.clear();
        read.rates.clear();
        read.successes.clear();
        let source = source(MockReader::new(&[], read));

        assert_err!(source.fetch_snapshot().await);
    }

    #[tokio::test]
    async fn test_snapshot_mapping() {
        let mut labels = HashMap::new();
        labels.insert(PoolId::from(SPARK), "SparkLend".to_string());
        let source = source(MockReader::new(&[], sample_read())).with_labels(labels);

        let snapshot = assert_ok!(source.fetch_snapshot().await);
        assert_eq!(snapshot.active_pool_id, PoolId::from(AAVE));
        assert_eq!(snapshot.best_pool_id, PoolId::from(SPARK));
        assert_eq!(snapshot.rebalance_threshold_raw, percent_to_ray(0.5));
        assert_eq!(snapshot.pool_name(&PoolId::from(SPARK)), "SparkLend");
        assert_eq!(snapshot.source, SnapshotSource::Live);
    }

    #[tokio::test]
    async fn test_ledger_flag_never_contradicts_rates() {
        let mut read = sample_read();
        read.should_rebalance = true;
        read.best_rate = percent_to_ray(3.0);
        let source = source(MockReader::new(&[], read));

        let snapshot = assert_ok!(source.fetch_snapshot().await);
        assert!(!snapshot.should_rebalance);
    }
}
