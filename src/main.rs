//! Vault Sentinel - yield vault rebalance monitor
//!
//! Run with: cargo run
//!
//! Polls the vault (or a simulated market), decides when the rate spread
//! justifies moving funds, and walks each rebalance through withdraw and
//! supply. Status is printed as it changes; Ctrl-C stops the engine.

use color_eyre::eyre::Result;
use console::style;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod brain;
mod cartographer;
mod config;
mod engine;
mod error;
mod executor;
mod history;
mod ray;

use brain::{Decision, DriftBounds, SimulatedMarket};
use cartographer::{
    AlloyVaultReader, EndpointPool, PoolId, RateSource, SimulatedVault, VaultFeed, VaultSnapshot,
};
use config::{Config, DataMode, StatusFormat};
use engine::{Engine, EngineSettings, EngineStatus, ReadModel, VaultView};
use executor::{ActivityEntry, LedgerSettlement, SettlementExecutor, TimedSettlement};

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🛡  VAULT SENTINEL - Yield Rebalance Monitor").cyan().bold()
    );
    println!(
        "{}",
        style("    Endpoint Failover | Debounced Rebalance | Activity Feed").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn build_feed(config: &Config) -> Result<Arc<dyn VaultFeed>> {
    match config.data_mode {
        DataMode::Live => {
            let endpoints = Arc::new(EndpointPool::new(config.rpc_urls.clone())?);
            let reader = AlloyVaultReader::new(config.vault()?, config.request_timeout());
            let labels: HashMap<PoolId, String> = config.labels().into_iter().collect();

            info!(
                "Live feed: vault {} via {} endpoints",
                config.vault_address,
                endpoints.len()
            );
            Ok(Arc::new(RateSource::new(endpoints, reader).with_labels(labels)))
        }
        DataMode::Simulation => {
            let rng = match config.sim_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            // rates stay within 2%..8%
            let bounds = DriftBounds::from_percent(config.sim_max_step_percent, 2.0, 8.0);
            let market = SimulatedMarket::new(SimulatedMarket::<StdRng>::default_pools(), bounds, rng);

            info!(
                "Simulated feed: active {}, threshold {:.2}%",
                config.sim_active_pool, config.sim_threshold_percent
            );
            Ok(Arc::new(SimulatedVault::new(
                market,
                PoolId::new(config.sim_active_pool.clone()),
                ray::percent_to_ray(config.sim_threshold_percent),
            )?))
        }
    }
}

/// Live legs wait for the vault to confirm; simulated legs just take time
fn build_settlement(config: &Config, feed: &Arc<dyn VaultFeed>) -> Arc<dyn SettlementExecutor> {
    match config.data_mode {
        DataMode::Live => {
            info!(
                "Settlement confirmed against the vault (every {:?}, timeout {:?})",
                config.confirm_poll(),
                config.confirm_timeout()
            );
            Arc::new(LedgerSettlement::new(
                Arc::clone(feed),
                config.confirm_poll(),
                config.confirm_timeout(),
            ))
        }
        DataMode::Simulation => Arc::new(TimedSettlement::new(config.settlement_step())),
    }
}

// ============================================
// STATUS OUTPUT
// ============================================

#[derive(Serialize)]
struct StatusReport<'a> {
    vault: &'a VaultView,
    decision: Option<&'a Decision>,
    status: &'a EngineStatus,
}

fn print_snapshot(snapshot: &VaultSnapshot, decision: Option<&Decision>) {
    println!(
        "{} {} snapshot @ {}",
        style("▸").cyan(),
        style(snapshot.source).bold(),
        snapshot.fetched_at.format("%H:%M:%S")
    );
    for quote in &snapshot.all_quotes {
        let marker = if quote.pool_id == snapshot.active_pool_id {
            style("● active").green().to_string()
        } else if quote.pool_id == snapshot.best_pool_id {
            style("▲ best").cyan().to_string()
        } else {
            String::new()
        };
        let rate = if quote.fetch_succeeded {
            format!("{:>6}%", quote.rate_percent())
        } else {
            style("  n/a  ").red().to_string()
        };
        println!("    {:<24} {} {}", quote.display_name(), rate, marker);
    }

    match decision {
        Some(d) if d.insufficient_data => {
            println!("    {}", style("insufficient data: no pool rates available").yellow());
        }
        Some(d) => println!(
            "    spread {}% vs threshold {}% → {}",
            d.spread_percent(),
            d.threshold_percent(),
            if d.should_rebalance {
                style("REBALANCE").yellow().bold().to_string()
            } else {
                style("hold").green().to_string()
            }
        ),
        None => {}
    }
}

fn print_status(format: StatusFormat, read_model: &ReadModel) -> Result<()> {
    let vault = read_model.vault.borrow().clone();
    let decision = read_model.decision.borrow().clone();
    let status = read_model.status.borrow().clone();

    match format {
        StatusFormat::Json => {
            let report = StatusReport {
                vault: &vault,
                decision: decision.as_ref(),
                status: &status,
            };
            println!("{}", serde_json::to_string(&report)?);
        }
        StatusFormat::Table => {
            if let Some(snapshot) = &vault.snapshot {
                print_snapshot(snapshot, decision.as_ref());
                println!("    TVL {}", style(vault.tvl_display()).bold());
            } else if vault.is_loading {
                println!("{} waiting for first snapshot...", style("…").dim());
            }
            if let Some(err) = &vault.last_error {
                println!("    {} {}", style("⚠ last fetch failed:").red(), err);
            }
        }
    }
    Ok(())
}

fn print_activity(format: StatusFormat, fresh: &[ActivityEntry]) -> Result<()> {
    // oldest of the new batch first so the console reads top to bottom
    for entry in fresh.iter().rev() {
        match format {
            StatusFormat::Json => println!("{}", serde_json::to_string(entry)?),
            StatusFormat::Table => println!(
                "  {} [{}] {}: {}",
                style(entry.timestamp.format("%H:%M:%S")).dim(),
                style(entry.source_chain).magenta(),
                style(&entry.event_type).bold(),
                entry.details
            ),
        }
    }
    Ok(())
}

fn print_history() {
    println!("{}", style("═══ RECENT CALLBACKS ═══").blue().bold());
    for tx in history::sample_transactions() {
        println!(
            "  #{:<3} {}  {} → {}  block {}  {}",
            tx.tx_number,
            tx.timestamp,
            history::truncate_hash(&tx.reactive_hash),
            history::truncate_hash(&tx.destination_hash),
            tx.block_number,
            style(history::reactscan_url(history::RVM_ADDRESS, tx.tx_number)).dim()
        );
    }
    println!();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vault_sentinel=info".parse()?),
        )
        .init();

    print_banner();

    let config = Config::load()?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or CONFIG_FILE");
        return Err(e);
    }

    config.print_summary();
    println!();

    if config.status_format == StatusFormat::Table {
        print_history();
        if config.data_mode == DataMode::Live {
            println!(
                "Vault: {}",
                style(history::etherscan_address_url(&config.vault_address)).dim()
            );
            println!();
        }
    }

    let feed = build_feed(&config)?;
    let settlement = build_settlement(&config, &feed);
    let settings = EngineSettings {
        poll_interval: config.poll_interval(),
        tick_interval: config.tick_interval(),
        debounce: config.debounce(),
        cron_start_blocks: config.cron_start_blocks,
        cron_cycle_blocks: config.cron_cycle_blocks,
    };

    let (engine, mut read_model) = Engine::new(feed, settlement, settings);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    let format = config.status_format;
    let mut last_phase = read_model.status.borrow().phase;
    let mut last_seen = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Shutdown requested");
                break;
            }
            changed = read_model.vault.changed() => {
                if changed.is_err() {
                    warn!("Engine stopped publishing");
                    break;
                }
                print_status(format, &read_model)?;
            }
            changed = read_model.status.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = read_model.status.borrow().phase;
                if phase != last_phase && format == StatusFormat::Table {
                    println!("{} {} → {}", style("◆").yellow(), last_phase, style(phase).yellow().bold());
                }
                last_phase = phase;
            }
            changed = read_model.activity.changed() => {
                if changed.is_err() {
                    break;
                }
                let entries = read_model.activity.borrow().clone();
                let fresh: Vec<ActivityEntry> = entries
                    .iter()
                    .take_while(|e| Some(*e) != last_seen.as_ref())
                    .cloned()
                    .collect();
                if let Some(newest) = entries.first() {
                    last_seen = Some(newest.clone());
                }
                print_activity(format, &fresh)?;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = engine_task.await {
        warn!("Engine task ended abnormally: {}", e);
    }

    println!();
    println!("{}", style(" ✅ SENTINEL STOPPED").green().bold());
    Ok(())
}
