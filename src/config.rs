//! Configuration for the Vault Sentinel
//!
//! Every parameter has a default, so an empty environment runs the
//! simulated feed. Live mode needs RPC endpoints and the vault address.

use alloy_primitives::Address;
use eyre::Result;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::brain::SimulatedMarket;
use crate::cartographer::PoolId;

// ============================================
// DATA MODE
// ============================================

/// Where vault data comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Contract reads over JSON-RPC with endpoint failover
    Live,

    /// Randomly drifting in-memory market, no network
    #[default]
    Simulation,
}

impl std::fmt::Display for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataMode::Live => write!(f, "LIVE"),
            DataMode::Simulation => write!(f, "SIMULATION"),
        }
    }
}

/// How the status view is printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    #[default]
    Table,
    Json,
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    pub data_mode: DataMode,

    /// JSON-RPC endpoints, tried in order on failure
    pub rpc_urls: Vec<String>,

    /// Yield vault contract
    pub vault_address: String,

    /// Chain ID (11155111 = Sepolia)
    pub chain_id: u64,

    /// Display names for pool addresses
    pub pool_labels: BTreeMap<String, String>,

    // ========== Timing ==========
    pub poll_interval_secs: u64,
    pub request_timeout_ms: u64,
    /// Countdown and decision re-evaluation
    pub tick_interval_ms: u64,
    /// How long a rebalance condition must hold before acting
    pub debounce_ms: u64,
    /// Per-leg delay of the simulated settlement
    pub settlement_step_ms: u64,
    /// Live legs: how often the vault is re-read while waiting for a leg
    pub confirm_poll_secs: u64,
    /// Live legs: give up on a leg the vault has not confirmed by then
    pub confirm_timeout_secs: u64,
    /// Countdown shown at start-up; later cycles use `cron_cycle_blocks`
    pub cron_start_blocks: u32,
    pub cron_cycle_blocks: u32,

    // ========== Simulation ==========
    pub sim_threshold_percent: f64,
    pub sim_drift_interval_secs: u64,
    pub sim_max_step_percent: f64,
    pub sim_active_pool: String,
    /// Fixed seed for a reproducible drift; entropy when unset
    pub sim_seed: Option<u64>,

    // ========== Output ==========
    pub status_format: StatusFormat,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Network
            data_mode: match env::var("DATA_MODE")
                .unwrap_or_else(|_| "simulation".to_string())
                .to_lowercase()
                .as_str()
            {
                "live" => DataMode::Live,
                _ => DataMode::Simulation,
            },
            rpc_urls: env::var("RPC_URLS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.rpc_urls),
            vault_address: env::var("VAULT_ADDRESS").unwrap_or(defaults.vault_address),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "11155111".to_string())
                .parse()
                .unwrap_or(11155111),
            pool_labels: env::var("POOL_LABELS")
                .map(|s| parse_labels(&s))
                .unwrap_or(defaults.pool_labels),

            // Timing
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            tick_interval_ms: env::var("TICK_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            debounce_ms: env::var("DEBOUNCE_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            settlement_step_ms: env::var("SETTLEMENT_STEP_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            confirm_poll_secs: env::var("CONFIRM_POLL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            confirm_timeout_secs: env::var("CONFIRM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            cron_start_blocks: env::var("CRON_START_BLOCKS")
                .unwrap_or_else(|_| "45".to_string())
                .parse()
                .unwrap_or(45),
            cron_cycle_blocks: env::var("CRON_CYCLE_BLOCKS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            // Simulation
            sim_threshold_percent: env::var("SIM_THRESHOLD_PERCENT")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .unwrap_or(2.0),
            sim_drift_interval_secs: env::var("SIM_DRIFT_INTERVAL_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            sim_max_step_percent: env::var("SIM_MAX_STEP_PERCENT")
                .unwrap_or_else(|_| "0.4".to_string())
                .parse()
                .unwrap_or(0.4),
            sim_active_pool: env::var("SIM_ACTIVE_POOL").unwrap_or(defaults.sim_active_pool),
            sim_seed: env::var("SIM_SEED").ok().and_then(|s| s.parse().ok()),

            // Output
            status_format: match env::var("STATUS_FORMAT")
                .unwrap_or_else(|_| "table".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => StatusFormat::Json,
                _ => StatusFormat::Table,
            },
        })
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// `CONFIG_FILE` when set, the environment otherwise
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        match env::var("CONFIG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Self::from_env(),
        }
    }

    /// Sepolia endpoints, in failover order
    fn default_rpc_urls() -> Vec<String> {
        vec![
            "https://rpc.sepolia.org".to_string(),
            "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            "https://sepolia.gateway.tenderly.co".to_string(),
            "https://rpc2.sepolia.org".to_string(),
        ]
    }

    fn default_pool_labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "0x1DbaE63b3a7dd56438eCd25c1816d53E519b6720".to_string(), // Aave mock pool
                "Aave V3".to_string(),
            ),
            (
                "0x548a8308464bDF1F96409ef684537137bcd0C7E2".to_string(), // Spark mock pool
                "SparkLend".to_string(),
            ),
            (
                "0x985d3d497f39C7359DC535205b3b1c7e49063A5B".to_string(), // Compound mock pool
                "Compound".to_string(),
            ),
        ])
    }

    /// Validate configuration before the engine starts
    pub fn validate(&self) -> Result<()> {
        if self.data_mode == DataMode::Live {
            if !self.rpc_urls.iter().any(|u| !u.trim().is_empty()) {
                return Err(eyre::eyre!("Live mode requires at least one entry in RPC_URLS"));
            }
            self.vault()?;
            for address in self.pool_labels.keys() {
                Address::from_str(address.trim())
                    .map_err(|e| eyre::eyre!("Invalid pool label address {}: {}", address, e))?;
            }
        }

        let intervals = [
            ("POLL_INTERVAL_SECS", self.poll_interval_secs),
            ("REQUEST_TIMEOUT_MS", self.request_timeout_ms),
            ("TICK_INTERVAL_MS", self.tick_interval_ms),
            ("SETTLEMENT_STEP_MS", self.settlement_step_ms),
            ("CONFIRM_POLL_SECS", self.confirm_poll_secs),
            ("CONFIRM_TIMEOUT_SECS", self.confirm_timeout_secs),
            ("CRON_START_BLOCKS", u64::from(self.cron_start_blocks)),
            ("SIM_DRIFT_INTERVAL_SECS", self.sim_drift_interval_secs),
            ("CRON_CYCLE_BLOCKS", u64::from(self.cron_cycle_blocks)),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(eyre::eyre!("{} must be greater than zero", name));
        }

        if !(self.sim_threshold_percent > 0.0 && self.sim_threshold_percent < 100.0) {
            return Err(eyre::eyre!(
                "SIM_THRESHOLD_PERCENT must be between 0 and 100 (currently {})",
                self.sim_threshold_percent
            ));
        }
        if !(self.sim_max_step_percent >= 0.0 && self.sim_max_step_percent < 100.0) {
            return Err(eyre::eyre!(
                "SIM_MAX_STEP_PERCENT must be between 0 and 100 (currently {})",
                self.sim_max_step_percent
            ));
        }

        if self.data_mode == DataMode::Simulation {
            let pools = SimulatedMarket::<StdRng>::default_pools();
            if !pools.iter().any(|p| p.id.as_str() == self.sim_active_pool) {
                let known: Vec<&str> = pools.iter().map(|p| p.id.as_str()).collect();
                return Err(eyre::eyre!(
                    "SIM_ACTIVE_POOL {:?} is not a simulated pool (expected one of {})",
                    self.sim_active_pool,
                    known.join(", ")
                ));
            }
        }

        Ok(())
    }

    pub fn vault(&self) -> Result<Address> {
        Address::from_str(self.vault_address.trim())
            .map_err(|e| eyre::eyre!("Invalid VAULT_ADDRESS {:?}: {}", self.vault_address, e))
    }

    /// Pool labels keyed by checksummed id. Unparseable addresses are skipped.
    pub fn labels(&self) -> Vec<(PoolId, String)> {
        self.pool_labels
            .iter()
            .filter_map(|(addr, label)| {
                let address = Address::from_str(addr.trim()).ok()?;
                Some((PoolId::from(address), label.clone()))
            })
            .collect()
    }

    /// Fetch cadence: the drift interval for the simulated feed
    pub fn poll_interval(&self) -> Duration {
        match self.data_mode {
            DataMode::Live => Duration::from_secs(self.poll_interval_secs),
            DataMode::Simulation => Duration::from_secs(self.sim_drift_interval_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settlement_step(&self) -> Duration {
        Duration::from_millis(self.settlement_step_ms)
    }

    pub fn confirm_poll(&self) -> Duration {
        Duration::from_secs(self.confirm_poll_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║            VAULT SENTINEL - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Data Mode:         {:^40} ║", self.data_mode);
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("╠════════════════════════════════════════════════════════════╣");
        match self.data_mode {
            DataMode::Live => {
                println!("║ LIVE FEED                                                  ║");
                println!("║ • Vault:           {:^40} ║", self.vault_address);
                println!("║ • RPC Endpoints:   {:^40} ║", self.rpc_urls.len());
                println!("║ • Poll Interval:   {:>37} s ║", self.poll_interval_secs);
                println!("║ • Request Timeout: {:>36} ms ║", self.request_timeout_ms);
                println!("║ • Labelled Pools:  {:^40} ║", self.pool_labels.len());
                println!("║ • Confirm Every:   {:>37} s ║", self.confirm_poll_secs);
                println!("║ • Confirm Timeout: {:>37} s ║", self.confirm_timeout_secs);
            }
            DataMode::Simulation => {
                println!("║ SIMULATION                                                 ║");
                println!("║ • Threshold:       {:>38.2}% ║", self.sim_threshold_percent);
                println!("║ • Drift Every:     {:>37} s ║", self.sim_drift_interval_secs);
                println!("║ • Max Step:        {:>38.2}% ║", self.sim_max_step_percent);
                println!("║ • Active Pool:     {:^40} ║", self.sim_active_pool);
                println!("║ • Settlement Step: {:>36} ms ║", self.settlement_step_ms);
                println!("║ • Seed:            {:^40} ║",
                    self.sim_seed.map(|s| s.to_string()).unwrap_or_else(|| "entropy".to_string())
                );
            }
        }
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REBALANCE                                                  ║");
        println!("║ • Debounce:        {:>36} ms ║", self.debounce_ms);
        println!("║ • First Cron In:   {:>33} blocks ║", self.cron_start_blocks);
        println!("║ • Cron Cycle:      {:>33} blocks ║", self.cron_cycle_blocks);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_mode: DataMode::Simulation,
            rpc_urls: Self::default_rpc_urls(),
            vault_address: "0xc8F25cf0aB99e77D8671301c2f19B03554F80B5b".to_string(),
            chain_id: 11155111,
            pool_labels: Self::default_pool_labels(),
            poll_interval_secs: 30,
            request_timeout_ms: 10_000,
            tick_interval_ms: 1000,
            debounce_ms: 500,
            settlement_step_ms: 2000,
            confirm_poll_secs: 5,
            confirm_timeout_secs: 300,
            cron_start_blocks: 45,
            cron_cycle_blocks: 50,
            sim_threshold_percent: 2.0,
            sim_drift_interval_secs: 3,
            sim_max_step_percent: 0.4,
            sim_active_pool: "pool-a".to_string(),
            sim_seed: None,
            status_format: StatusFormat::Table,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `0xabc=Aave V3,0xdef=SparkLend`
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    split_list(raw)
        .iter()
        .filter_map(|pair| {
            let (addr, label) = pair.split_once('=')?;
            Some((addr.trim().to_string(), label.trim().to_string()))
        })
        .collect()
}

// ============================================
// TESTS
// ============================================
