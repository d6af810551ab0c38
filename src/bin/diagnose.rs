//! Diagnostic tool - Check configuration before running the sentinel
//!
//! Run with: cargo run --bin diagnose
//!
//! Never touches the network.

use alloy_primitives::Address;
use std::env;
use std::str::FromStr;

fn main() {
    println!("🔍 VAULT SENTINEL DIAGNOSTIC CHECK\n");

    // Load .env
    dotenvy::dotenv().ok();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    if let Ok(path) = env::var("CONFIG_FILE") {
        println!("  CONFIG_FILE: {}", path);
        println!("    └─ TOML file overrides every key below\n");
    }

    let checks = [
        ("DATA_MODE", "simulation", "live or simulation"),
        ("POLL_INTERVAL_SECS", "30", "Seconds between live vault reads"),
        ("REQUEST_TIMEOUT_MS", "10000", "Per-endpoint request timeout"),
        ("TICK_INTERVAL_MS", "1000", "Countdown / re-evaluation tick"),
        ("DEBOUNCE_MS", "500", "Condition must hold this long"),
        ("SETTLEMENT_STEP_MS", "2000", "Simulated time per withdraw / supply leg"),
        ("CONFIRM_POLL_SECS", "5", "Live: vault re-read interval while a leg settles"),
        ("CONFIRM_TIMEOUT_SECS", "300", "Live: leg fails if the vault has not moved by then"),
        ("SIM_THRESHOLD_PERCENT", "2.0", "Simulated rebalance threshold"),
        ("SIM_DRIFT_INTERVAL_SECS", "3", "Seconds between simulated drifts"),
        ("SIM_MAX_STEP_PERCENT", "0.4", "Largest simulated rate move"),
        ("CRON_START_BLOCKS", "45", "Ticks before the first cron entry"),
        ("CRON_CYCLE_BLOCKS", "50", "Ticks between cron entries"),
        ("STATUS_FORMAT", "table", "table or json"),
    ];

    for (key, default, desc) in checks {
        let value = env::var(key).unwrap_or_else(|_| default.to_string());
        let marker = if env::var(key).is_err() { "(default)" } else { "(from .env)" };
        println!("  {}: {} {}", key, value, marker);
        println!("    └─ {}\n", desc);
    }

    let seed = env::var("SIM_SEED").unwrap_or_else(|_| "not set (entropy)".to_string());
    println!("  SIM_SEED: {}", seed);

    // Live feed inputs
    let rpc_urls: Vec<String> = env::var("RPC_URLS")
        .map(|s| {
            s.split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let vault = env::var("VAULT_ADDRESS").ok();
    let vault_ok = vault
        .as_deref()
        .map(|v| Address::from_str(v.trim()).is_ok())
        .unwrap_or(false);

    println!("\n═══════════════════════════════════════════════════");
    println!("                 LIVE READINESS                     ");
    println!("═══════════════════════════════════════════════════\n");

    if rpc_urls.is_empty() {
        println!("  RPC_URLS:      ➖ Not set (built-in Sepolia list)");
    } else {
        println!("  RPC_URLS:      ✅ {} endpoint(s)", rpc_urls.len());
        for (i, url) in rpc_urls.iter().enumerate() {
            let shown = if url.len() > 50 && url.is_ascii() {
                format!("{}...{}", &url[..30], &url[url.len() - 15..])
            } else {
                url.clone()
            };
            println!("    {}. {}", i + 1, shown);
        }
    }
    match (&vault, vault_ok) {
        (None, _) => println!("  VAULT_ADDRESS: ➖ Not set (built-in Sepolia vault)"),
        (Some(_), true) => println!("  VAULT_ADDRESS: ✅ Valid"),
        (Some(v), false) => println!("  VAULT_ADDRESS: ❌ Not an address: {}", v),
    }

    let mode = env::var("DATA_MODE").unwrap_or_else(|_| "simulation".to_string());

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match mode.to_lowercase().as_str() {
        "live" => {
            println!("  📡 LIVE MODE");
            println!("     → Reads pool rates from the vault contract");
            println!("     → Fails over across RPC endpoints");
            println!("     → Rebalances settle only once the vault's active pool moves");
            println!("     → Nothing is signed or submitted");

            if vault.is_some() && !vault_ok {
                println!("\n  ⚠️  WARNING: VAULT_ADDRESS is invalid, the sentinel will refuse to start.");
            }
        }
        "simulation" => {
            println!("  📋 SIMULATION MODE");
            println!("     → Three pools drift randomly in memory");
            println!("     → No network access");
        }
        _ => {
            println!("  ❓ Unknown mode: {} (falls back to simulation)", mode);
        }
    }

    let threshold: f64 = env::var("SIM_THRESHOLD_PERCENT")
        .unwrap_or_else(|_| "2.0".to_string())
        .parse()
        .unwrap_or(2.0);
    if !(threshold > 0.0 && threshold < 100.0) {
        println!("\n  ⚠️  SIM_THRESHOLD_PERCENT must be between 0 and 100.");
    }

    println!("\n✅ Diagnostic complete!\n");
}
